//! Network executing a sequence of layer pipelines.
use super::layers::{aggregate, join_state, split_state, BuildState, Layer, LayerSpec, Lstm};
use super::{Network, NetworkOutput};
use crate::specs::TensorSpec;
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::{Prng, TensorforceError};
use log::debug;
use ndarray::{s, stack, Array1, Array2, ArrayD, Axis, Ix2};
use std::collections::HashSet;

/// Network built from layer pipelines.
///
/// Layers are applied in order. The first layer takes the single input if there is exactly one;
/// otherwise pipelines start with a `retrieve` layer. An `lstm` layer may only come last.
#[derive(Debug)]
pub struct LayeredNetwork {
    inputs_spec: TensorDict<TensorSpec>,
    output_spec: TensorSpec,
    layers: Vec<(String, Layer)>,
    lstm: Option<Lstm>,
}

impl LayeredNetwork {
    /// Build the network, creating variables under `scope/<layer name>`.
    ///
    /// # Errors
    /// If the inputs are invalid, layer names repeat,
    /// an `lstm` layer is not last, or any layer is incompatible with its input.
    pub fn new(
        scope: &str,
        inputs_spec: &TensorDict<TensorSpec>,
        pipelines: &[Vec<LayerSpec>],
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        if inputs_spec.is_empty() {
            return Err(TensorforceError::required(scope, "inputs"));
        }
        for (name, spec) in inputs_spec.iter() {
            spec.validate(name)?;
        }

        let specs: Vec<&LayerSpec> = pipelines.iter().flatten().collect();
        let mut names = HashSet::new();
        for spec in &specs {
            if !names.insert(spec.name()) {
                return Err(TensorforceError::value(
                    scope,
                    "layer name",
                    spec.name(),
                    "unique layer names",
                ));
            }
        }

        let mut state = BuildState {
            current: single_value(inputs_spec).cloned(),
            registry: inputs_spec.clone(),
        };
        let mut layers = Vec::with_capacity(specs.len());
        let mut recurrent = None;
        for (i, spec) in specs.iter().enumerate() {
            let layer = Layer::build(spec, &mut state, scope, vs, rng)?;
            if let Layer::Lstm(lstm) = layer {
                if i + 1 != specs.len() {
                    return Err(TensorforceError::value(
                        spec.name(),
                        "position",
                        i,
                        "lstm must be the last layer",
                    ));
                }
                recurrent = Some(lstm);
            } else {
                layers.push((spec.name().to_owned(), layer));
            }
        }
        let output_spec = state
            .current
            .ok_or_else(|| TensorforceError::required(scope, "layers"))?;

        debug!(
            "{}: {} layers, output {}{}",
            scope,
            specs.len(),
            output_spec,
            if recurrent.is_some() { " (recurrent)" } else { "" }
        );
        Ok(Self {
            inputs_spec: inputs_spec.clone(),
            output_spec,
            layers,
            lstm: recurrent,
        })
    }

    /// Apply the non-recurrent layers to every row of the inputs.
    fn forward(&self, states: &TensorDict<Tensor>) -> Result<Tensor, TensorforceError> {
        let mut registry = states.clone();
        let mut current = single_value(states).cloned();
        for (name, layer) in &self.layers {
            let next = match layer {
                Layer::Retrieve {
                    tensors,
                    aggregation,
                } => {
                    let inputs = tensors
                        .iter()
                        .map(|tensor| registry.require(name, tensor))
                        .collect::<Result<Vec<_>, _>>()?;
                    aggregate(name, &inputs, *aggregation)?
                }
                Layer::Register { tensor } => {
                    let input = current
                        .take()
                        .ok_or_else(|| TensorforceError::required(name, "input tensor"))?;
                    registry.insert(tensor.clone(), input.clone());
                    input
                }
                layer => {
                    let input = current
                        .as_ref()
                        .ok_or_else(|| TensorforceError::required(name, "input tensor"))?;
                    layer.forward(name, input)?
                }
            };
            current = Some(next);
        }
        current.ok_or_else(|| TensorforceError::required("network", "layers"))
    }

    fn check_states(&self, states: &TensorDict<Tensor>) -> Result<usize, TensorforceError> {
        let mut rows = None;
        for (name, spec) in self.inputs_spec.iter() {
            let state = states.require("network", name)?;
            state.check_spec(name, spec.dtype, &spec.shape)?;
            let state_rows = state.batch_size().unwrap_or(0);
            match rows {
                Some(rows) if rows != state_rows => {
                    return Err(TensorforceError::mismatch(
                        name,
                        "batch size",
                        rows,
                        state_rows,
                    ))
                }
                _ => rows = Some(state_rows),
            }
        }
        Ok(rows.unwrap_or(0))
    }
}

/// Validate `[batch_size, 2]` horizons against the number of state rows.
///
/// Returns the `(start, length)` windows.
fn check_horizons(
    horizons: &Array2<i64>,
    rows: usize,
) -> Result<Vec<(usize, usize)>, TensorforceError> {
    if horizons.ncols() != 2 {
        return Err(TensorforceError::mismatch(
            "network",
            "horizons shape",
            "[batch_size, 2]",
            format!("{:?}", horizons.shape()),
        ));
    }
    horizons
        .rows()
        .into_iter()
        .map(|row| {
            let start = usize::try_from(row[0]).ok();
            let length = usize::try_from(row[1]).ok().filter(|&length| length >= 1);
            match (start, length) {
                (Some(start), Some(length)) if start + length <= rows => Ok((start, length)),
                _ => Err(TensorforceError::value(
                    "network",
                    "horizons",
                    format!("({}, {})", row[0], row[1]),
                    format!("start >= 0, length >= 1, start + length <= {}", rows),
                )),
            }
        })
        .collect()
}

fn single_value<T>(dict: &TensorDict<T>) -> Option<&T> {
    if dict.len() == 1 {
        dict.values().next()
    } else {
        None
    }
}

impl Network for LayeredNetwork {
    fn inputs_spec(&self) -> &TensorDict<TensorSpec> {
        &self.inputs_spec
    }

    fn output_spec(&self) -> &TensorSpec {
        &self.output_spec
    }

    fn internals_spec(&self) -> TensorDict<TensorSpec> {
        self.lstm
            .iter()
            .map(|lstm| (lstm.internal_name().to_owned(), lstm.internal_spec()))
            .collect()
    }

    fn internals_init(&self) -> TensorDict<ArrayD<f32>> {
        self.lstm
            .iter()
            .map(|lstm| (lstm.internal_name().to_owned(), lstm.internal_init()))
            .collect()
    }

    fn max_past_horizon(&self, on_policy: bool) -> usize {
        self.past_horizon(on_policy)
    }

    fn past_horizon(&self, on_policy: bool) -> usize {
        // On-policy internals carry the history
        match &self.lstm {
            Some(lstm) if !on_policy => lstm.horizon(),
            _ => 0,
        }
    }

    fn apply(
        &self,
        states: &TensorDict<Tensor>,
        horizons: &Array2<i64>,
        internals: &TensorDict<Tensor>,
        return_internals: bool,
    ) -> Result<NetworkOutput, TensorforceError> {
        let rows = self.check_states(states)?;
        let windows = check_horizons(horizons, rows)?;

        let lstm = match &self.lstm {
            None => {
                // Only the last row of each window is used
                let indices: Vec<usize> = windows
                    .iter()
                    .map(|&(start, length)| start + length - 1)
                    .collect();
                let states = states.try_fmap(|_, state| state.gather(&indices))?;
                return Ok(NetworkOutput {
                    embedding: self.forward(&states)?,
                    internals: if return_internals {
                        Some(TensorDict::new())
                    } else {
                        None
                    },
                });
            }
            Some(lstm) => lstm,
        };

        let name = lstm.internal_name();
        let embeddings = self.forward(states)?;
        let embeddings = embeddings
            .as_float()
            .ok_or_else(|| TensorforceError::dtype(name, "input", embeddings.dtype()))?
            .view()
            .into_dimensionality::<Ix2>()?;
        let initial = internals.require(name, name)?;
        let initial = initial
            .as_float()
            .ok_or_else(|| TensorforceError::dtype(name, "internal", initial.dtype()))?;
        if initial.shape().first() != Some(&windows.len()) {
            return Err(TensorforceError::mismatch(
                name,
                "internals batch size",
                windows.len(),
                format!("{:?}", initial.shape()),
            ));
        }

        let mut hidden_states = Vec::with_capacity(windows.len());
        let mut final_internals = Vec::with_capacity(windows.len());
        for (i, &(start, length)) in windows.iter().enumerate() {
            let state = split_state(initial.index_axis(Axis(0), i), lstm.size())?;
            let inputs = embeddings.slice(s![start..start + length, ..]);
            let state = lstm.unroll(inputs.rows(), state)?;
            final_internals.push(join_state(&state)?);
            hidden_states.push(state.0);
        }
        let outputs: Vec<_> = hidden_states.iter().map(Array1::view).collect();
        let embedding = stack(Axis(0), &outputs)?.into_dyn();

        let internals = if return_internals {
            let views: Vec<_> = final_internals.iter().map(|x| x.view()).collect();
            let mut dict = TensorDict::new();
            dict.insert(name, Tensor::Float(stack(Axis(0), &views)?));
            Some(dict)
        } else {
            None
        };
        Ok(NetworkOutput {
            embedding: Tensor::Float(embedding),
            internals,
        })
    }

    fn variables(&self) -> Vec<Variable> {
        self.layers
            .iter()
            .flat_map(|(_, layer)| layer.variables())
            .chain(self.lstm.iter().flat_map(Lstm::variables))
            .collect()
    }
}
