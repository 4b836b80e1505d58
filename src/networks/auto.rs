//! Automatically configured network
use super::layers::{Aggregation, LayerSpec, Reduction};
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::TensorDict;
use crate::TensorforceError;
use log::debug;
use serde::{Deserialize, Serialize};

/// Configuration of a network derived from its input specifications.
///
/// Each input gets its own pipeline (embedding for bool/int inputs, then `depth` layers chosen
/// by the input rank, then max-pooling for multi-dimensional inputs), and the per-input
/// embeddings are concatenated and processed by `final_depth` dense layers if there is more
/// than one input. Optionally an LSTM cell is appended as the last layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoNetworkConfig {
    /// Layer size, before concatenation if multiple inputs.
    pub size: usize,
    /// Number of layers per input, before concatenation if multiple inputs.
    pub depth: usize,
    /// Layer size after concatenation if multiple inputs (default: `size`).
    pub final_size: Option<usize>,
    /// Number of layers after concatenation if multiple inputs.
    pub final_depth: usize,
    /// Whether to add an LSTM cell with internal state as last layer, and if so, its horizon
    /// for truncated backpropagation through time.
    pub rnn: Option<usize>,
}

impl Default for AutoNetworkConfig {
    fn default() -> Self {
        Self {
            size: 64,
            depth: 2,
            final_size: None,
            final_depth: 1,
            rnn: None,
        }
    }
}

impl AutoNetworkConfig {
    /// Synthesize the network definition: one pipeline per input followed by the final pipeline.
    ///
    /// # Errors
    /// If an input rank (counting the embedding dimension of bool/int inputs) exceeds 3,
    /// or if `size` or `depth` is zero.
    pub fn layers(
        &self,
        inputs_spec: &TensorDict<TensorSpec>,
    ) -> Result<Vec<Vec<LayerSpec>>, TensorforceError> {
        if self.size == 0 {
            return Err(TensorforceError::value("AutoNetwork", "size", 0, "> 0"));
        }
        if self.depth == 0 {
            return Err(TensorforceError::value("AutoNetwork", "depth", 0, "> 0"));
        }
        let final_size = self.final_size.unwrap_or(self.size);

        let mut layers = Vec::with_capacity(inputs_spec.len() + 1);
        for (input_name, spec) in inputs_spec.iter() {
            layers.push(self.input_layers(input_name, spec)?);
        }

        let mut final_layers = vec![LayerSpec::Retrieve {
            name: "retrieve".to_owned(),
            tensors: inputs_spec
                .keys()
                .map(|input_name| format!("{}-embedding", input_name))
                .collect(),
            aggregation: Aggregation::Concat,
        }];

        if inputs_spec.len() > 1 {
            for n in 0..self.final_depth {
                final_layers.push(LayerSpec::Dense {
                    name: format!("dense{}", n),
                    size: final_size,
                });
            }
        }

        if let Some(horizon) = self.rnn {
            final_layers.push(LayerSpec::Lstm {
                name: "lstm".to_owned(),
                size: final_size,
                horizon,
            });
        }
        layers.push(final_layers);

        debug!(
            "auto network for {} inputs: {} layers",
            inputs_spec.len(),
            layers.iter().map(Vec::len).sum::<usize>()
        );
        Ok(layers)
    }

    fn input_layers(
        &self,
        input_name: &str,
        spec: &TensorSpec,
    ) -> Result<Vec<LayerSpec>, TensorforceError> {
        let mut state_layers = vec![LayerSpec::Retrieve {
            name: format!("{}_retrieve", input_name),
            tensors: vec![input_name.to_owned()],
            aggregation: Aggregation::Concat,
        }];

        // Embed bool and int inputs, which adds a dimension and takes one unit of depth
        let requires_embedding = matches!(spec.dtype, TensorType::Bool | TensorType::Int);
        if requires_embedding {
            state_layers.push(LayerSpec::Embedding {
                name: format!("{}_embedding", input_name),
                size: self.size,
            });
        }
        let rank = spec.rank() + usize::from(requires_embedding);

        let kind = match rank {
            1 => LayerKind::Dense,
            2 => LayerKind::Conv1d,
            3 => LayerKind::Conv2d,
            0 => {
                state_layers.push(LayerSpec::Flatten {
                    name: format!("{}_flatten", input_name),
                });
                LayerKind::Dense
            }
            _ => {
                let hint = if requires_embedding {
                    "<= 2 for bool/int inputs"
                } else {
                    "<= 3"
                };
                return Err(TensorforceError::value(
                    "AutoNetwork",
                    "input rank",
                    spec.rank(),
                    hint,
                ));
            }
        };

        for n in 0..(self.depth - usize::from(requires_embedding)) {
            let name = format!("{}_{}{}", input_name, kind.as_str(), n);
            state_layers.push(kind.layer(name, self.size));
        }

        // Max pool if rank greater than one
        if rank > 1 {
            state_layers.push(LayerSpec::Pooling {
                name: format!("{}_pooling", input_name),
                reduction: Reduction::Max,
            });
        }

        state_layers.push(LayerSpec::Register {
            name: format!("{}_register", input_name),
            tensor: format!("{}-embedding", input_name),
        });
        Ok(state_layers)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum LayerKind {
    Dense,
    Conv1d,
    Conv2d,
}

impl LayerKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Conv1d => "conv1d",
            Self::Conv2d => "conv2d",
        }
    }

    fn layer(self, name: String, size: usize) -> LayerSpec {
        match self {
            Self::Dense => LayerSpec::Dense { name, size },
            Self::Conv1d => LayerSpec::Conv1d { name, size },
            Self::Conv2d => LayerSpec::Conv2d { name, size },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn single(name: &str, spec: TensorSpec) -> TensorDict<TensorSpec> {
        [(name, spec)].into_iter().collect()
    }

    /// Kind of the last shape layer (before pooling and register).
    fn last_shape_layer(pipeline: &[LayerSpec]) -> &'static str {
        pipeline
            .iter()
            .rev()
            .map(LayerSpec::kind)
            .find(|kind| !matches!(*kind, "pooling" | "register"))
            .unwrap()
    }

    #[rstest]
    #[case(vec![], "dense")]
    #[case(vec![4], "dense")]
    #[case(vec![8, 3], "conv1d")]
    #[case(vec![8, 8, 3], "conv2d")]
    fn float_rank_selects_layer(#[case] shape: Vec<usize>, #[case] expected: &str) {
        let layers = AutoNetworkConfig::default()
            .layers(&single("state", TensorSpec::float(shape)))
            .unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(last_shape_layer(&layers[0]), expected);
    }

    #[test]
    fn float_rank_four_fails() {
        let result =
            AutoNetworkConfig::default().layers(&single("state", TensorSpec::float([2, 2, 2, 2])));
        assert!(matches!(
            result,
            Err(TensorforceError::Value { ref argument, .. }) if argument == "input rank"
        ));
    }

    #[test]
    fn embedded_rank_three_fails() {
        let result =
            AutoNetworkConfig::default().layers(&single("state", TensorSpec::int([2, 2, 2], 4)));
        assert_eq!(
            result.map(|_| ()),
            Err(TensorforceError::value(
                "AutoNetwork",
                "input rank",
                3,
                "<= 2 for bool/int inputs"
            ))
        );
    }

    #[test]
    fn scalar_float_is_flattened() {
        let layers = AutoNetworkConfig::default()
            .layers(&single("state", TensorSpec::float([])))
            .unwrap();
        let kinds: Vec<_> = layers[0].iter().map(LayerSpec::kind).collect();
        assert_eq!(
            kinds,
            vec!["retrieve", "flatten", "dense", "dense", "register"]
        );
    }

    #[test]
    fn int_vector_is_embedded_and_pooled() {
        let layers = AutoNetworkConfig::default()
            .layers(&single("state", TensorSpec::int([5], 3)))
            .unwrap();
        let names: Vec<_> = layers[0].iter().map(LayerSpec::name).collect();
        assert_eq!(
            names,
            vec![
                "state_retrieve",
                "state_embedding",
                "state_conv1d0",
                "state_pooling",
                "state_register"
            ]
        );
    }

    #[test]
    fn int_scalar_embedding_takes_one_depth() {
        let config = AutoNetworkConfig {
            depth: 3,
            ..AutoNetworkConfig::default()
        };
        let layers = config
            .layers(&single("state", TensorSpec::int([], 4)))
            .unwrap();
        let kinds: Vec<_> = layers[0].iter().map(LayerSpec::kind).collect();
        assert_eq!(
            kinds,
            vec!["retrieve", "embedding", "dense", "dense", "register"]
        );
    }

    #[test]
    fn multiple_inputs_are_concatenated_and_merged() {
        let inputs: TensorDict<TensorSpec> = [
            ("a", TensorSpec::float([3])),
            ("b", TensorSpec::bool([2])),
            ("c", TensorSpec::float([4, 4])),
        ]
        .into_iter()
        .collect();
        let config = AutoNetworkConfig {
            final_depth: 2,
            final_size: Some(16),
            ..AutoNetworkConfig::default()
        };
        let layers = config.layers(&inputs).unwrap();
        assert_eq!(layers.len(), 4);
        let final_layers = &layers[3];
        assert_eq!(
            final_layers[0],
            LayerSpec::Retrieve {
                name: "retrieve".to_owned(),
                tensors: vec![
                    "a-embedding".to_owned(),
                    "b-embedding".to_owned(),
                    "c-embedding".to_owned()
                ],
                aggregation: Aggregation::Concat,
            }
        );
        assert_eq!(
            &final_layers[1..],
            &[
                LayerSpec::Dense {
                    name: "dense0".to_owned(),
                    size: 16
                },
                LayerSpec::Dense {
                    name: "dense1".to_owned(),
                    size: 16
                }
            ]
        );
    }

    #[test]
    fn single_input_has_no_final_dense() {
        let config = AutoNetworkConfig {
            final_depth: 5,
            ..AutoNetworkConfig::default()
        };
        let layers = config
            .layers(&single("state", TensorSpec::float([3])))
            .unwrap();
        let final_layers = &layers[1];
        assert_eq!(final_layers.len(), 1);
        assert_eq!(final_layers[0].kind(), "retrieve");
    }

    #[test]
    fn rnn_is_last() {
        let config = AutoNetworkConfig {
            rnn: Some(4),
            size: 8,
            ..AutoNetworkConfig::default()
        };
        let layers = config
            .layers(&single("state", TensorSpec::float([3])))
            .unwrap();
        assert_eq!(
            layers[1].last(),
            Some(&LayerSpec::Lstm {
                name: "lstm".to_owned(),
                size: 8,
                horizon: 4
            })
        );
    }
}
