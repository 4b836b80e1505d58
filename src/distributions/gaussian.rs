//! Gaussian distribution over float actions.
use super::config::{BoundedTransform, GaussianConfig, StddevMode};
use super::{
    check_action_dtype, is_deterministic, wrong_parameters, Distribution, LinearHead, Parameters,
};
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::utils::numeric::EPSILON;
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f32::consts::PI;

const LOG_STDDEV_MIN: f32 = -20.0;
const LOG_STDDEV_MAX: f32 = 2.0;

#[derive(Debug)]
enum Stddev {
    Predicted(LinearHead),
    Global(Variable),
}

/// Diagonal Gaussian distribution.
///
/// Bounded actions are either clipped into range or squashed through `tanh`.
#[derive(Debug)]
pub struct Gaussian {
    action_spec: TensorSpec,
    mean: LinearHead,
    stddev: Stddev,
    /// Transform and `(min, max)` bounds, if the action is bounded.
    bounds: Option<(BoundedTransform, f32, f32)>,
}

impl Gaussian {
    /// # Errors
    /// If the action is not a float or the embedding is not a float vector.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        path: &str,
        action_spec: TensorSpec,
        embedding_spec: &TensorSpec,
        config: GaussianConfig,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        check_action_dtype(&action_spec, "gaussian", TensorType::Float)?;
        let shape = action_spec.shape.clone();
        let mean = LinearHead::new(
            &format!("{}/mean", path),
            embedding_spec,
            shape.clone(),
            vs,
            rng,
        )?;
        let stddev = match config.stddev_mode {
            StddevMode::Predicted => Stddev::Predicted(LinearHead::new(
                &format!("{}/log_stddev", path),
                embedding_spec,
                shape,
                vs,
                rng,
            )?),
            StddevMode::Global => Stddev::Global(vs.zeros(format!("{}/log_stddev", path), &shape)?),
        };
        let bounds = match (action_spec.min_value, action_spec.max_value) {
            (Some(min), Some(max)) => Some((config.bounded_transform, min as f32, max as f32)),
            _ => None,
        };
        Ok(Self {
            action_spec,
            mean,
            stddev,
            bounds,
        })
    }

    /// Map an unbounded value into the action range.
    fn squash(&self, x: f32) -> f32 {
        match self.bounds {
            None => x,
            Some((BoundedTransform::Clipping, min, max)) => x.clamp(min, max),
            Some((BoundedTransform::Tanh, min, max)) => min + (max - min) * 0.5 * (x.tanh() + 1.0),
        }
    }

    /// Unbounded value of an action and the log-density correction of the transform.
    fn unsquash(&self, action: f32) -> (f32, f32) {
        match self.bounds {
            Some((BoundedTransform::Tanh, min, max)) => {
                let y = (2.0 * (action - min) / (max - min) - 1.0)
                    .clamp(-1.0 + EPSILON, 1.0 - EPSILON);
                let x = y.atanh();
                (x, -(1.0 - y * y + EPSILON).ln())
            }
            _ => (action, 0.0),
        }
    }
}

fn parameters(parameters: &Parameters) -> Result<(&ArrayD<f32>, &ArrayD<f32>), TensorforceError> {
    match parameters {
        Parameters::Gaussian { mean, log_stddev } => Ok((mean, log_stddev)),
        other => Err(wrong_parameters("gaussian", other)),
    }
}

fn float_action<'a>(action: &'a Tensor) -> Result<&'a ArrayD<f32>, TensorforceError> {
    action
        .as_float()
        .ok_or_else(|| TensorforceError::dtype("gaussian", "action", action.dtype()))
}

/// Repeat a per-instance array along a new batch axis.
fn broadcast_batch(value: &ArrayD<f32>, shape: &[usize]) -> Result<ArrayD<f32>, TensorforceError> {
    value
        .view()
        .insert_axis(Axis(0))
        .broadcast(IxDyn(shape))
        .map(|x| x.to_owned())
        .ok_or_else(|| {
            TensorforceError::mismatch(
                "gaussian",
                "log_stddev shape",
                format!("{:?}", shape),
                format!("{:?}", value.shape()),
            )
        })
}

/// Log-density of `N(mean, exp(log_stddev)^2)` at `x`.
fn normal_log_density(x: f32, mean: f32, log_stddev: f32) -> f32 {
    let z = (x - mean) * (-log_stddev).exp();
    -0.5 * z * z - log_stddev - 0.5 * (2.0 * PI).ln()
}

impl Distribution for Gaussian {
    fn action_spec(&self) -> &TensorSpec {
        &self.action_spec
    }

    fn parametrize(
        &self,
        embedding: &ArrayD<f32>,
        _conditions: &TensorDict<Tensor>,
    ) -> Result<Parameters, TensorforceError> {
        let mean = self.mean.forward(embedding)?;
        let log_stddev = match &self.stddev {
            Stddev::Predicted(head) => head.forward(embedding)?,
            Stddev::Global(variable) => broadcast_batch(&variable.read(), mean.shape())?,
        };
        Ok(Parameters::Gaussian {
            mean,
            log_stddev: log_stddev.mapv(|s| s.clamp(LOG_STDDEV_MIN, LOG_STDDEV_MAX)),
        })
    }

    fn sample(
        &self,
        parameters: &Parameters,
        temperature: f32,
        rng: &mut Prng,
    ) -> Result<Tensor, TensorforceError> {
        let (mean, log_stddev) = self::parameters(parameters)?;
        let action = if is_deterministic(temperature) {
            mean.mapv(|m| self.squash(m))
        } else {
            Zip::from(mean).and(log_stddev).map_collect(|&m, &s| {
                let noise: f32 = rng.sample(StandardNormal);
                self.squash(m + temperature * s.exp() * noise)
            })
        };
        Ok(Tensor::Float(action))
    }

    fn log_probability(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let (mean, log_stddev) = self::parameters(parameters)?;
        let action = float_action(action)?;
        if action.shape() != mean.shape() {
            return Err(TensorforceError::mismatch(
                "gaussian",
                "action shape",
                format!("{:?}", mean.shape()),
                format!("{:?}", action.shape()),
            ));
        }
        Ok(Zip::from(action)
            .and(mean)
            .and(log_stddev)
            .map_collect(|&a, &m, &s| {
                let (x, correction) = self.unsquash(a);
                normal_log_density(x, m, s) + correction
            }))
    }

    fn entropy(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let (_, log_stddev) = self::parameters(parameters)?;
        Ok(log_stddev.mapv(|s| 0.5 * (2.0 * PI * std::f32::consts::E).ln() + s))
    }

    fn kl_divergence(
        &self,
        parameters1: &Parameters,
        parameters2: &Parameters,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let (mean1, log_stddev1) = self::parameters(parameters1)?;
        let (mean2, log_stddev2) = self::parameters(parameters2)?;
        if mean1.shape() != mean2.shape() {
            return Err(TensorforceError::mismatch(
                "gaussian",
                "parameters shape",
                format!("{:?}", mean1.shape()),
                format!("{:?}", mean2.shape()),
            ));
        }
        Ok(Zip::from(mean1)
            .and(log_stddev1)
            .and(mean2)
            .and(log_stddev2)
            .map_collect(|&m1, &s1, &m2, &s2| {
                let var1 = (2.0 * s1).exp();
                let var2 = (2.0 * s2).exp();
                s2 - s1 + (var1 + (m1 - m2) * (m1 - m2)) / (2.0 * var2) - 0.5
            }))
    }

    /// Log-density of the mean.
    fn states_value(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let (_, log_stddev) = self::parameters(parameters)?;
        Ok(log_stddev.mapv(|s| -s - 0.5 * (2.0 * PI).ln()))
    }

    fn action_value(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        self.log_probability(parameters, action)
    }

    fn all_action_values(&self, _parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        Err(TensorforceError::invalid("gaussian", "all_action_values"))
    }

    fn variables(&self) -> Vec<Variable> {
        let mut variables = self.mean.variables();
        match &self.stddev {
            Stddev::Predicted(head) => variables.extend(head.variables()),
            Stddev::Global(variable) => variables.push(variable.clone()),
        }
        variables
    }
}
