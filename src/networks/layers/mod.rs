//! Network layers: serializable descriptors and their built counterparts.
mod conv;
mod dense;
mod embedding;
mod lstm;
mod reshape;

pub use conv::Conv;
pub use dense::Dense;
pub use embedding::Embedding;
pub use lstm::{join_state, split_state, Lstm, LstmState};
pub use reshape::{aggregate, flatten, pool};

use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::{Prng, TensorforceError};
use serde::{Deserialize, Serialize};

/// How `retrieve` combines multiple tensors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Concatenate along the last axis.
    Concat,
    /// Elementwise sum.
    Sum,
    /// Elementwise product.
    Product,
}

impl Default for Aggregation {
    fn default() -> Self {
        Self::Concat
    }
}

/// Reduction over the spatial axes applied by a pooling layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Max,
    Mean,
    Sum,
}

/// Layer descriptor, selected by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Fetch one or more named tensors (inputs or registered tensors).
    Retrieve {
        name: String,
        tensors: Vec<String>,
        #[serde(default)]
        aggregation: Aggregation,
    },
    /// Store the current tensor under a name for later retrieval.
    Register { name: String, tensor: String },
    /// Lookup embedding of bool or int values; adds a trailing axis of the given size.
    Embedding { name: String, size: usize },
    /// Affine transformation of the last axis followed by `tanh`.
    Dense { name: String, size: usize },
    /// Affine transformation of the last axis. Size 0 drops the last axis.
    Linear { name: String, size: usize },
    /// Same-padded 1D convolution with kernel size 3 followed by `tanh`.
    #[serde(rename = "conv1d")]
    Conv1d { name: String, size: usize },
    /// Same-padded 2D convolution with a 3x3 kernel followed by `tanh`.
    #[serde(rename = "conv2d")]
    Conv2d { name: String, size: usize },
    /// Reshape to a single axis.
    Flatten { name: String },
    /// Reduce every axis except the last.
    Pooling { name: String, reduction: Reduction },
    /// LSTM cell with internal state. Must be the last layer.
    Lstm {
        name: String,
        size: usize,
        horizon: usize,
    },
}

impl LayerSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Retrieve { name, .. }
            | Self::Register { name, .. }
            | Self::Embedding { name, .. }
            | Self::Dense { name, .. }
            | Self::Linear { name, .. }
            | Self::Conv1d { name, .. }
            | Self::Conv2d { name, .. }
            | Self::Flatten { name }
            | Self::Pooling { name, .. }
            | Self::Lstm { name, .. } => name,
        }
    }

    /// The layer type name, as used for `type` in configurations.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Retrieve { .. } => "retrieve",
            Self::Register { .. } => "register",
            Self::Embedding { .. } => "embedding",
            Self::Dense { .. } => "dense",
            Self::Linear { .. } => "linear",
            Self::Conv1d { .. } => "conv1d",
            Self::Conv2d { .. } => "conv2d",
            Self::Flatten { .. } => "flatten",
            Self::Pooling { .. } => "pooling",
            Self::Lstm { .. } => "lstm",
        }
    }
}

/// A built layer.
#[derive(Debug)]
pub enum Layer {
    Retrieve {
        tensors: Vec<String>,
        aggregation: Aggregation,
    },
    Register {
        tensor: String,
    },
    Embedding(Embedding),
    Dense(Dense),
    Conv(Conv),
    Flatten,
    Pooling(Reduction),
    Lstm(Lstm),
}

/// Spec-level state while building a sequence of layers.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildState {
    /// Output spec of the previous layer, if any.
    pub current: Option<TensorSpec>,
    /// Inputs and registered tensors.
    pub registry: TensorDict<TensorSpec>,
}

impl Layer {
    /// Build a layer from its descriptor, creating its variables under `scope/<layer name>`.
    ///
    /// Updates `state` with the output spec of the layer.
    ///
    /// # Errors
    /// If the layer is incompatible with its input spec or a variable name is taken.
    pub fn build(
        spec: &LayerSpec,
        state: &mut BuildState,
        scope: &str,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        let name = spec.name();
        let path = format!("{}/{}", scope, name);

        let (layer, output) = match spec {
            LayerSpec::Retrieve {
                tensors,
                aggregation,
                ..
            } => {
                let specs = tensors
                    .iter()
                    .map(|tensor| state.registry.require(name, tensor))
                    .collect::<Result<Vec<_>, _>>()?;
                let output = reshape::aggregate_spec(name, &specs, *aggregation)?;
                (
                    Self::Retrieve {
                        tensors: tensors.clone(),
                        aggregation: *aggregation,
                    },
                    output,
                )
            }
            LayerSpec::Register { tensor, .. } => {
                let input = current_input(name, state)?;
                state.registry.insert(tensor.clone(), input.clone());
                (
                    Self::Register {
                        tensor: tensor.clone(),
                    },
                    input,
                )
            }
            LayerSpec::Embedding { size, .. } => {
                let input = current_input(name, state)?;
                let layer = Embedding::new(name, &path, &input, *size, vs, rng)?;
                let mut shape = input.shape;
                shape.push(*size);
                (Self::Embedding(layer), TensorSpec::float(shape))
            }
            LayerSpec::Dense { size, .. } | LayerSpec::Linear { size, .. } => {
                let input = current_input(name, state)?;
                let activation = matches!(spec, LayerSpec::Dense { .. });
                let input_size = feature_size(name, &input, 1)?;
                let layer = Dense::new(&path, input_size, *size, activation, vs, rng)?;
                let mut shape = input.shape;
                shape.pop();
                if *size > 0 {
                    shape.push(*size);
                }
                (Self::Dense(layer), TensorSpec::float(shape))
            }
            LayerSpec::Conv1d { size, .. } | LayerSpec::Conv2d { size, .. } => {
                let input = current_input(name, state)?;
                let spatial = if matches!(spec, LayerSpec::Conv1d { .. }) {
                    1
                } else {
                    2
                };
                if input.rank() != spatial + 1 {
                    return Err(TensorforceError::value(
                        name,
                        "input rank",
                        input.rank(),
                        format!("{}", spatial + 1),
                    ));
                }
                let input_size = feature_size(name, &input, spatial + 1)?;
                let layer = Conv::new(&path, spatial, input_size, *size, vs, rng)?;
                let mut shape = input.shape;
                shape.pop();
                shape.push(*size);
                (Self::Conv(layer), TensorSpec::float(shape))
            }
            LayerSpec::Flatten { .. } => {
                let input = current_input(name, state)?;
                let output = input.with_shape([input.size()]);
                (Self::Flatten, output)
            }
            LayerSpec::Pooling { reduction, .. } => {
                let input = current_input(name, state)?;
                let features = feature_size(name, &input, 2)?;
                (Self::Pooling(*reduction), TensorSpec::float([features]))
            }
            LayerSpec::Lstm { size, horizon, .. } => {
                let input = current_input(name, state)?;
                if input.rank() != 1 {
                    return Err(TensorforceError::value(
                        name,
                        "input rank",
                        input.rank(),
                        "1",
                    ));
                }
                let input_size = feature_size(name, &input, 1)?;
                let layer = Lstm::new(&path, name, input_size, *size, *horizon, vs, rng)?;
                (Self::Lstm(layer), TensorSpec::float([*size]))
            }
        };
        state.current = Some(output);
        Ok(layer)
    }

    /// Apply a layer that only depends on its input tensor.
    ///
    /// # Errors
    /// If the input is incompatible with the layer,
    /// or if called on a retrieve, register or lstm layer.
    pub fn forward(&self, name: &str, input: &Tensor) -> Result<Tensor, TensorforceError> {
        Ok(match self {
            Self::Embedding(layer) => Tensor::Float(layer.forward(name, input)?),
            Self::Dense(layer) => Tensor::Float(layer.forward(&float_input(name, input)?)?),
            Self::Conv(layer) => Tensor::Float(layer.forward(&float_input(name, input)?)?),
            Self::Flatten => flatten(input)?,
            Self::Pooling(reduction) => {
                Tensor::Float(pool(name, &float_input(name, input)?, *reduction)?)
            }
            Self::Retrieve { .. } | Self::Register { .. } | Self::Lstm(_) => {
                return Err(TensorforceError::invalid(name, "stateless forward"))
            }
        })
    }

    /// Variables of the layer.
    pub fn variables(&self) -> Vec<Variable> {
        match self {
            Self::Embedding(layer) => vec![layer.table().clone()],
            Self::Dense(layer) => layer.variables(),
            Self::Conv(layer) => layer.variables(),
            Self::Lstm(layer) => layer.variables(),
            Self::Retrieve { .. } | Self::Register { .. } | Self::Flatten | Self::Pooling(_) => {
                Vec::new()
            }
        }
    }
}

fn current_input(name: &str, state: &BuildState) -> Result<TensorSpec, TensorforceError> {
    state
        .current
        .clone()
        .ok_or_else(|| TensorforceError::required(name, "input tensor"))
}

/// Size of the last axis of a float input with at least `min_rank` axes.
fn feature_size(name: &str, input: &TensorSpec, min_rank: usize) -> Result<usize, TensorforceError> {
    if input.dtype != TensorType::Float {
        return Err(TensorforceError::dtype(name, "input", input.dtype));
    }
    if input.rank() < min_rank {
        return Err(TensorforceError::value(
            name,
            "input rank",
            input.rank(),
            format!(">= {}", min_rank),
        ));
    }
    Ok(input.shape[input.rank() - 1])
}

fn float_input(name: &str, input: &Tensor) -> Result<ndarray::ArrayD<f32>, TensorforceError> {
    input
        .as_float()
        .cloned()
        .ok_or_else(|| TensorforceError::dtype(name, "input", input.dtype()))
}

/// Glorot normal initialization standard deviation.
#[allow(clippy::cast_precision_loss)]
fn glorot_stddev(fan_in: usize, fan_out: usize) -> f32 {
    (2.0 / (fan_in + fan_out).max(1) as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn build_one(spec: LayerSpec, input: TensorSpec) -> Result<(Layer, TensorSpec), TensorforceError> {
        let mut state = BuildState {
            current: Some(input),
            registry: TensorDict::new(),
        };
        let mut vs = VarStore::new();
        let mut rng = Prng::seed_from_u64(0);
        let layer = Layer::build(&spec, &mut state, "net", &mut vs, &mut rng)?;
        Ok((layer, state.current.unwrap()))
    }

    #[test]
    fn deserialize_layer_spec() {
        let spec: LayerSpec =
            serde_json::from_str(r#"{"type": "conv2d", "name": "c", "size": 8}"#).unwrap();
        assert_eq!(
            spec,
            LayerSpec::Conv2d {
                name: "c".to_owned(),
                size: 8
            }
        );
        let spec: LayerSpec =
            serde_json::from_str(r#"{"type": "retrieve", "name": "r", "tensors": ["a", "b"]}"#)
                .unwrap();
        assert_eq!(
            spec,
            LayerSpec::Retrieve {
                name: "r".to_owned(),
                tensors: vec!["a".to_owned(), "b".to_owned()],
                aggregation: Aggregation::Concat,
            }
        );
    }

    #[test]
    fn dense_output_spec() {
        let (_, output) = build_one(
            LayerSpec::Dense {
                name: "d".to_owned(),
                size: 5,
            },
            TensorSpec::float([4, 3]),
        )
        .unwrap();
        assert_eq!(output, TensorSpec::float([4, 5]));
    }

    #[test]
    fn linear_size_zero_is_scalar() {
        let (_, output) = build_one(
            LayerSpec::Linear {
                name: "value".to_owned(),
                size: 0,
            },
            TensorSpec::float([3]),
        )
        .unwrap();
        assert_eq!(output, TensorSpec::float([]));
    }

    #[test]
    fn dense_rejects_int_input() {
        let result = build_one(
            LayerSpec::Dense {
                name: "d".to_owned(),
                size: 5,
            },
            TensorSpec::int([3], 4),
        );
        assert!(matches!(result, Err(TensorforceError::Type { .. })));
    }

    #[test]
    fn conv2d_requires_rank_three() {
        let result = build_one(
            LayerSpec::Conv2d {
                name: "c".to_owned(),
                size: 5,
            },
            TensorSpec::float([4, 3]),
        );
        assert!(matches!(result, Err(TensorforceError::Value { .. })));
    }

    #[test]
    fn retrieve_unknown_tensor_fails() {
        let mut state = BuildState {
            current: None,
            registry: TensorDict::new(),
        };
        let spec = LayerSpec::Retrieve {
            name: "r".to_owned(),
            tensors: vec!["missing".to_owned()],
            aggregation: Aggregation::Concat,
        };
        let result = Layer::build(
            &spec,
            &mut state,
            "net",
            &mut VarStore::new(),
            &mut Prng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(TensorforceError::Required { .. })));
    }

    #[test]
    fn layer_without_input_fails() {
        let mut state = BuildState {
            current: None,
            registry: TensorDict::new(),
        };
        let spec = LayerSpec::Flatten {
            name: "f".to_owned(),
        };
        let result = Layer::build(
            &spec,
            &mut state,
            "net",
            &mut VarStore::new(),
            &mut Prng::seed_from_u64(0),
        );
        assert!(result.is_err());
    }
}
