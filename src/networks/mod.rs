//! Networks: map (batched, possibly historical) states to an embedding.
mod auto;
mod layered;
pub mod layers;

pub use auto::AutoNetworkConfig;
pub use layered::LayeredNetwork;
pub use layers::{Aggregation, LayerSpec, Reduction};

use crate::specs::TensorSpec;
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::{Prng, TensorforceError};
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A state embedding network.
///
/// # Horizons
/// States are given as a buffer of `rows` consecutive entries and `horizons` selects the
/// window of rows for each batch element: row `i` of `horizons` is `(start, length)`
/// and the element's embedding is computed from rows `start..start + length`
/// (the last row being the current timestep).
pub trait Network: fmt::Debug {
    /// Per-instance input specs, by state name.
    fn inputs_spec(&self) -> &TensorDict<TensorSpec>;

    /// Per-instance spec of the embedding.
    fn output_spec(&self) -> &TensorSpec;

    /// Per-instance specs of the internal (recurrent) state.
    fn internals_spec(&self) -> TensorDict<TensorSpec>;

    /// Per-instance initial internal state.
    fn internals_init(&self) -> TensorDict<ArrayD<f32>>;

    /// Maximum number of past timesteps the network may consume.
    fn max_past_horizon(&self, on_policy: bool) -> usize;

    /// Number of past timesteps the network currently consumes.
    fn past_horizon(&self, on_policy: bool) -> usize;

    /// Compute the embedding.
    ///
    /// # Args
    /// * `states` - State buffers, each of shape `[rows, *spec.shape]`.
    /// * `horizons` - `[batch_size, 2]` array of `(start, length)` windows into `states`.
    /// * `internals` - Internal state at the start of each window, each `[batch_size, ...]`.
    /// * `return_internals` - Whether to return the internal state after each window.
    ///
    /// # Errors
    /// If the arguments do not match the network specs.
    fn apply(
        &self,
        states: &TensorDict<Tensor>,
        horizons: &Array2<i64>,
        internals: &TensorDict<Tensor>,
        return_internals: bool,
    ) -> Result<NetworkOutput, TensorforceError>;

    /// Variables of the network.
    fn variables(&self) -> Vec<Variable>;
}

/// Output of [`Network::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOutput {
    /// Embedding of shape `[batch_size, *output_spec.shape]`.
    pub embedding: Tensor,
    /// Internal state after each window, if requested.
    pub internals: Option<TensorDict<Tensor>>,
}

/// Horizons selecting every row as a single-timestep window.
#[allow(clippy::cast_possible_wrap)]
pub fn single_step_horizons(batch_size: usize) -> Array2<i64> {
    Array2::from_shape_fn((batch_size, 2), |(i, j)| if j == 0 { i as i64 } else { 1 })
}

/// Network configuration, selected by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkConfig {
    Auto(AutoNetworkConfig),
    Layered { layers: LayersConfig },
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::Auto(AutoNetworkConfig::default())
    }
}

/// Layers as a single list or as a list of pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayersConfig {
    Pipelines(Vec<Vec<LayerSpec>>),
    Layers(Vec<LayerSpec>),
}

impl LayersConfig {
    pub fn pipelines(&self) -> Vec<Vec<LayerSpec>> {
        match self {
            Self::Pipelines(pipelines) => pipelines.clone(),
            Self::Layers(layers) => vec![layers.clone()],
        }
    }
}

impl NetworkConfig {
    /// Build the network with its variables created under `scope`.
    ///
    /// # Errors
    /// If the layers are incompatible with the inputs.
    pub fn build(
        &self,
        scope: &str,
        inputs_spec: &TensorDict<TensorSpec>,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<LayeredNetwork, TensorforceError> {
        let pipelines = match self {
            Self::Auto(config) => config.layers(inputs_spec)?,
            Self::Layered { layers } => layers.pipelines(),
        };
        LayeredNetwork::new(scope, inputs_spec, &pipelines, vs, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn single_step_horizons_rows() {
        assert_eq!(single_step_horizons(3), arr2(&[[0, 1], [1, 1], [2, 1]]));
    }

    #[test]
    fn deserialize_auto_defaults() {
        let config: NetworkConfig = serde_json::from_str(r#"{"type": "auto", "rnn": 3}"#).unwrap();
        assert_eq!(
            config,
            NetworkConfig::Auto(AutoNetworkConfig {
                rnn: Some(3),
                ..AutoNetworkConfig::default()
            })
        );
    }

    #[test]
    fn deserialize_layered_flat() {
        let config: NetworkConfig = serde_json::from_str(
            r#"{"type": "layered", "layers": [{"type": "dense", "name": "d", "size": 4}]}"#,
        )
        .unwrap();
        match config {
            NetworkConfig::Layered { layers } => assert_eq!(layers.pipelines().len(), 1),
            NetworkConfig::Auto(_) => panic!("expected layered"),
        }
    }
}
