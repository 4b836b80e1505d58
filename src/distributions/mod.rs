//! Action distributions parametrized from a state embedding.
//!
//! Each distribution represents a batch of independent distributions, one per action element.
//! Statistics have shape `[batch_size, *action_shape]`.
mod bernoulli;
mod beta;
mod categorical;
mod config;
mod gaussian;

pub use bernoulli::Bernoulli;
pub use beta::Beta;
pub use categorical::Categorical;
pub use config::{
    BoundedTransform, DistributionConfig, DistributionFields, DistributionSpec, DistributionType,
    DistributionsConfig, GaussianConfig, StddevMode,
};
pub use gaussian::Gaussian;

use crate::networks::layers::Dense;
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::utils::numeric::EPSILON;
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, Axis, IxDyn};
use std::fmt;

/// Distribution parameters for a batch of actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameters {
    Bernoulli {
        /// Value of `false` and `true` for each element; shape `[batch, *shape, 2]`.
        action_values: ArrayD<f32>,
    },
    Categorical {
        /// Normalized log probabilities; shape `[batch, *shape, num_values]`.
        logits: ArrayD<f32>,
        /// Unnormalized (masked) values; shape `[batch, *shape, num_values]`.
        action_values: ArrayD<f32>,
    },
    Gaussian {
        mean: ArrayD<f32>,
        /// Clipped to `[-20, 2]`.
        log_stddev: ArrayD<f32>,
    },
    Beta {
        alpha: ArrayD<f32>,
        beta: ArrayD<f32>,
    },
}

impl Parameters {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bernoulli { .. } => "bernoulli",
            Self::Categorical { .. } => "categorical",
            Self::Gaussian { .. } => "gaussian",
            Self::Beta { .. } => "beta",
        }
    }
}

/// A batched action distribution with a learned parametrization.
pub trait Distribution: fmt::Debug {
    /// Spec of a single action.
    fn action_spec(&self) -> &TensorSpec;

    /// Compute the distribution parameters from a `[batch_size, size]` embedding.
    ///
    /// `conditions` holds auxiliary inputs such as an action `mask`.
    ///
    /// # Errors
    /// If the embedding or the conditions do not match the distribution.
    fn parametrize(
        &self,
        embedding: &ArrayD<f32>,
        conditions: &TensorDict<Tensor>,
    ) -> Result<Parameters, TensorforceError>;

    /// Sample actions.
    ///
    /// Temperatures below [`EPSILON`] select the mode (or mean); higher temperatures sample
    /// more uniformly.
    ///
    /// # Errors
    /// If the parameters belong to a different distribution.
    fn sample(
        &self,
        parameters: &Parameters,
        temperature: f32,
        rng: &mut Prng,
    ) -> Result<Tensor, TensorforceError>;

    /// # Errors
    /// If the parameters belong to a different distribution or the action has the wrong type.
    fn log_probability(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError>;

    /// # Errors
    /// If the parameters belong to a different distribution.
    fn entropy(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError>;

    /// `KL(parameters1 || parameters2)`.
    ///
    /// # Errors
    /// If the parameters belong to a different distribution or differ in shape.
    fn kl_divergence(
        &self,
        parameters1: &Parameters,
        parameters2: &Parameters,
    ) -> Result<ArrayD<f32>, TensorforceError>;

    /// Value estimate of the state implied by the parameters.
    ///
    /// # Errors
    /// If the parameters belong to a different distribution.
    fn states_value(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError>;

    /// Value estimate of taking the given action.
    ///
    /// # Errors
    /// If the parameters belong to a different distribution or the action has the wrong type.
    fn action_value(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError>;

    /// Value estimates of every action, with a trailing axis over the possible actions.
    ///
    /// # Errors
    /// If the distribution is continuous.
    fn all_action_values(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError>;

    /// Trainable variables of the parametrization.
    fn variables(&self) -> Vec<Variable>;
}

/// Affine head from the embedding to one value per action element and category.
#[derive(Debug)]
struct LinearHead {
    dense: Dense,
    /// Per-instance output shape.
    shape: Vec<usize>,
}

impl LinearHead {
    fn new(
        path: &str,
        embedding_spec: &TensorSpec,
        shape: Vec<usize>,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        let input_size = embedding_size(path, embedding_spec)?;
        let size = shape.iter().product();
        let dense = Dense::new(path, input_size, size, false, vs, rng)?;
        Ok(Self { dense, shape })
    }

    /// Output of shape `[batch_size, *shape]`.
    fn forward(&self, embedding: &ArrayD<f32>) -> Result<ArrayD<f32>, TensorforceError> {
        let output = self.dense.forward(embedding)?;
        let mut shape = vec![output.len_of(Axis(0))];
        shape.extend_from_slice(&self.shape);
        Ok(output.into_shape(IxDyn(&shape))?)
    }

    fn variables(&self) -> Vec<Variable> {
        self.dense.variables()
    }
}

/// Size of a rank-1 float embedding.
fn embedding_size(name: &str, spec: &TensorSpec) -> Result<usize, TensorforceError> {
    if spec.dtype != TensorType::Float {
        return Err(TensorforceError::dtype(name, "input", spec.dtype));
    }
    match spec.shape.as_slice() {
        [size] => Ok(*size),
        shape => Err(TensorforceError::value(
            name,
            "input rank",
            shape.len(),
            "embedding must have rank 1",
        )),
    }
}

fn check_action_dtype(
    spec: &TensorSpec,
    name: &str,
    expected: TensorType,
) -> Result<(), TensorforceError> {
    if spec.dtype == expected {
        Ok(())
    } else {
        Err(TensorforceError::dtype(name, "action_spec", spec.dtype))
    }
}

/// Whether sampling at this temperature selects the mode.
fn is_deterministic(temperature: f32) -> bool {
    temperature < EPSILON
}

/// Parameters of another distribution type.
fn wrong_parameters(name: &str, parameters: &Parameters) -> TensorforceError {
    TensorforceError::mismatch(name, "parameters", name, parameters.kind())
}

/// Select `values[..., indices[...]]` along the last axis.
fn select_last(
    name: &str,
    values: &ArrayD<f32>,
    indices: &ArrayD<usize>,
) -> Result<ArrayD<f32>, TensorforceError> {
    let (num_values, outer) = values
        .shape()
        .split_last()
        .ok_or_else(|| TensorforceError::value(name, "values rank", 0, ">= 1"))?;
    if outer != indices.shape() {
        return Err(TensorforceError::mismatch(
            name,
            "action shape",
            format!("{:?}", outer),
            format!("{:?}", indices.shape()),
        ));
    }
    let flat = values
        .as_standard_layout()
        .into_shape((indices.len(), *num_values))?;
    let selected: Vec<f32> = indices
        .iter()
        .zip(flat.rows())
        .map(|(&index, row)| row[index])
        .collect();
    Ok(ArrayD::from_shape_vec(indices.raw_dim(), selected)?)
}

/// Convert int actions to indices in `0..num_values`.
fn action_indices(
    name: &str,
    action: &Tensor,
    num_values: usize,
) -> Result<ArrayD<usize>, TensorforceError> {
    let action = action
        .as_int()
        .ok_or_else(|| TensorforceError::dtype(name, "action", action.dtype()))?;
    let indices = action
        .iter()
        .map(|&a| {
            usize::try_from(a)
                .ok()
                .filter(|&i| i < num_values)
                .ok_or_else(|| {
                    TensorforceError::value(
                        name,
                        "action",
                        a,
                        format!("0 <= action < {}", num_values),
                    )
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ArrayD::from_shape_vec(action.raw_dim(), indices)?)
}
