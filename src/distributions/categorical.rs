//! Categorical distribution over int actions.
use super::{
    action_indices, check_action_dtype, is_deterministic, select_last, wrong_parameters,
    Distribution, LinearHead, Parameters,
};
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Tensor, TensorDict, VarStore, Variable};
use crate::utils::numeric::{log_softmax_last, logsumexp_last};
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, ArrayView1, Axis, Zip};
use rand::Rng;
use rand_distr::Open01;

/// Categorical distribution with a value per possible action.
///
/// An optional boolean `mask` condition of shape `[batch, *shape, num_values]`
/// excludes the actions where it is `false`.
#[derive(Debug)]
pub struct Categorical {
    action_spec: TensorSpec,
    num_values: usize,
    head: LinearHead,
}

impl Categorical {
    /// # Errors
    /// If the action is not an int with `num_values` or the embedding is not a float vector.
    pub fn new(
        path: &str,
        action_spec: TensorSpec,
        embedding_spec: &TensorSpec,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        check_action_dtype(&action_spec, "categorical", TensorType::Int)?;
        let num_values = action_spec
            .num_values
            .ok_or_else(|| TensorforceError::required("categorical", "num_values"))?;
        let mut shape = action_spec.shape.clone();
        shape.push(num_values);
        let head = LinearHead::new(&format!("{}/action_values", path), embedding_spec, shape, vs, rng)?;
        Ok(Self {
            action_spec,
            num_values,
            head,
        })
    }

    /// Number of possible actions per element.
    pub const fn num_values(&self) -> usize {
        self.num_values
    }
}

fn parameters(parameters: &Parameters) -> Result<(&ArrayD<f32>, &ArrayD<f32>), TensorforceError> {
    match parameters {
        Parameters::Categorical {
            logits,
            action_values,
        } => Ok((logits, action_values)),
        other => Err(wrong_parameters("categorical", other)),
    }
}

/// Replace `-inf` by the lowest finite value so that `0 * logit` is zero.
fn clamp_float_min(logits: &ArrayD<f32>) -> ArrayD<f32> {
    logits.mapv(|l| l.max(f32::MIN))
}

#[allow(clippy::cast_possible_wrap)]
fn argmax(lane: ArrayView1<f32>) -> i64 {
    let mut best = 0;
    for (i, &v) in lane.iter().enumerate() {
        if v > lane[best] {
            best = i;
        }
    }
    best as i64
}

impl Distribution for Categorical {
    fn action_spec(&self) -> &TensorSpec {
        &self.action_spec
    }

    fn parametrize(
        &self,
        embedding: &ArrayD<f32>,
        conditions: &TensorDict<Tensor>,
    ) -> Result<Parameters, TensorforceError> {
        let mut action_values = self.head.forward(embedding)?;
        if let Some(mask) = conditions.get("mask") {
            let mask = mask
                .as_bool()
                .ok_or_else(|| TensorforceError::dtype("categorical", "mask", mask.dtype()))?;
            if mask.shape() != action_values.shape() {
                return Err(TensorforceError::mismatch(
                    "categorical",
                    "mask shape",
                    format!("{:?}", action_values.shape()),
                    format!("{:?}", mask.shape()),
                ));
            }
            Zip::from(&mut action_values).and(mask).for_each(|v, &m| {
                if !m {
                    *v = f32::MIN;
                }
            });
        }
        Ok(Parameters::Categorical {
            logits: log_softmax_last(&action_values),
            action_values,
        })
    }

    fn sample(
        &self,
        parameters: &Parameters,
        temperature: f32,
        rng: &mut Prng,
    ) -> Result<Tensor, TensorforceError> {
        let (logits, _) = self::parameters(parameters)?;
        let last = Axis(logits.ndim() - 1);
        let action = if is_deterministic(temperature) {
            logits.map_axis(last, argmax)
        } else {
            // Gumbel-max trick
            let perturbed = logits.mapv(|l| {
                let u: f32 = rng.sample(Open01);
                l / temperature - (-u.ln()).ln()
            });
            perturbed.map_axis(last, argmax)
        };
        Ok(Tensor::Int(action))
    }

    fn log_probability(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let (logits, _) = self::parameters(parameters)?;
        let indices = action_indices("categorical", action, self.num_values)?;
        select_last("categorical", logits, &indices)
    }

    fn entropy(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let (logits, _) = self::parameters(parameters)?;
        let logits = clamp_float_min(logits);
        let last = Axis(logits.ndim() - 1);
        Ok((logits.mapv(f32::exp) * &logits).sum_axis(last).mapv(|x| -x))
    }

    fn kl_divergence(
        &self,
        parameters1: &Parameters,
        parameters2: &Parameters,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let (logits1, _) = self::parameters(parameters1)?;
        let (logits2, _) = self::parameters(parameters2)?;
        if logits1.shape() != logits2.shape() {
            return Err(TensorforceError::mismatch(
                "categorical",
                "parameters shape",
                format!("{:?}", logits1.shape()),
                format!("{:?}", logits2.shape()),
            ));
        }
        let logits1 = clamp_float_min(logits1);
        let logits2 = clamp_float_min(logits2);
        let last = Axis(logits1.ndim() - 1);
        Ok((logits1.mapv(f32::exp) * (&logits1 - &logits2)).sum_axis(last))
    }

    fn states_value(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let (_, action_values) = self::parameters(parameters)?;
        Ok(logsumexp_last(action_values))
    }

    fn action_value(
        &self,
        parameters: &Parameters,
        action: &Tensor,
    ) -> Result<ArrayD<f32>, TensorforceError> {
        let (_, action_values) = self::parameters(parameters)?;
        let indices = action_indices("categorical", action, self.num_values)?;
        select_last("categorical", action_values, &indices)
    }

    fn all_action_values(&self, parameters: &Parameters) -> Result<ArrayD<f32>, TensorforceError> {
        let (_, action_values) = self::parameters(parameters)?;
        Ok(action_values.clone())
    }

    fn variables(&self) -> Vec<Variable> {
        self.head.variables()
    }
}
