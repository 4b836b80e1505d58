//! Policies: map states to actions and value estimates.
mod parametrized_distributions;

pub use parametrized_distributions::{
    InferStateValue, ParametrizedDistributions, ParametrizedDistributionsConfig, TemperatureConfig,
};

use crate::tensors::{Tensor, TensorDict};
use ndarray::Array2;

/// A batch of policy inputs.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInputs<'a> {
    /// State buffers, by state name. See [`Network`](crate::networks::Network) for the layout.
    pub states: &'a TensorDict<Tensor>,
    /// `[batch_size, 2]` array of `(start, length)` windows into `states`.
    pub horizons: &'a Array2<i64>,
    /// Internal state at the start of each window.
    pub internals: &'a TensorDict<Tensor>,
    /// Auxiliary conditions (such as an action `mask`), by action name.
    pub auxiliaries: &'a TensorDict<TensorDict<Tensor>>,
}

/// Actions selected by a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ActOutput {
    /// Actions of shape `[batch_size, *action_shape]`, by action name.
    pub actions: TensorDict<Tensor>,
    /// Internal state after each window, if requested.
    pub internals: Option<TensorDict<Tensor>>,
}
