//! Multi-step update modifier
use super::{Deltas, Optimizer, OptimizerConfig, StepInputs};
use crate::logging::StatsLogger;
use crate::parameters::{Parameter, ParameterBounds, ParameterConfig};
use crate::{Prng, TensorforceError};
use serde::{Deserialize, Serialize};

/// Configuration for [`MultiStep`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStepConfig {
    /// Wrapped optimizer.
    pub optimizer: Box<OptimizerConfig>,
    /// Number of steps (int >= 0).
    pub num_steps: ParameterConfig,
}

impl MultiStepConfig {
    /// # Errors
    /// If `num_steps` is out of range or the wrapped optimizer fails to build.
    pub fn build(&self, name: &str) -> Result<MultiStep, TensorforceError> {
        Ok(MultiStep {
            optimizer: self.optimizer.build(&format!("{}/optimizer", name))?,
            num_steps: self.num_steps.build(
                &format!("{}/num_steps", name),
                ParameterBounds::int().with_min(0.0),
            )?,
        })
    }
}

/// Update modifier that repeats the wrapped optimizer step on the same arguments.
///
/// Returns the sum of the deltas of all steps.
#[derive(Debug)]
pub struct MultiStep {
    optimizer: Box<dyn Optimizer>,
    num_steps: Box<dyn Parameter>,
}

impl Optimizer for MultiStep {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn step(
        &mut self,
        inputs: StepInputs,
        timestep: u64,
        rng: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> Result<Deltas, TensorforceError> {
        let num_steps = self.num_steps.value(timestep, rng).max(0.0) as usize;
        let mut total = inputs.zero_deltas();
        for _ in 0..num_steps {
            let deltas = self.optimizer.step(inputs, timestep, rng, logger)?;
            for (name, delta) in total.iter_mut() {
                *delta += deltas.require("multi_step", name)?;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check_optimizes_quadratic, Quadratic};
    use super::super::EvolutionaryConfig;
    use super::*;
    use crate::tensors::{Arguments, VarStore};
    use ndarray::arr1;
    use rand::SeedableRng;

    fn config(num_steps: f64) -> MultiStepConfig {
        MultiStepConfig {
            optimizer: Box::new(
                EvolutionaryConfig {
                    num_samples: 5.0.into(),
                    ..EvolutionaryConfig::new(0.05)
                }
                .into(),
            ),
            num_steps: num_steps.into(),
        }
    }

    #[test]
    fn returns_total_delta() {
        let mut vs = VarStore::new();
        let objective = Quadratic::new(&mut vs);
        let mut optimizer = config(3.0).build("optimizer").unwrap();
        let arguments = Arguments::new();
        let inputs = StepInputs {
            arguments: &arguments,
            variables: vs.variables(),
            objective: &objective,
        };
        let deltas = optimizer
            .step(inputs, 0, &mut Prng::seed_from_u64(0), &mut ())
            .unwrap();
        let difference = objective.x.value() - deltas.get("x").unwrap();
        assert!(difference.iter().all(|d| d.abs() < 1e-5));
    }

    #[test]
    fn zero_steps_is_noop() {
        let mut vs = VarStore::new();
        let objective = Quadratic::new(&mut vs);
        let mut optimizer = config(0.0).build("optimizer").unwrap();
        let arguments = Arguments::new();
        let inputs = StepInputs {
            arguments: &arguments,
            variables: vs.variables(),
            objective: &objective,
        };
        let deltas = optimizer
            .step(inputs, 0, &mut Prng::seed_from_u64(0), &mut ())
            .unwrap();
        assert_eq!(deltas.get("x"), Some(&arr1(&[0.0_f32, 0.0]).into_dyn()));
        assert_eq!(objective.x.value(), arr1(&[0.0_f32, 0.0]).into_dyn());
    }

    #[test]
    fn fractional_steps_fail() {
        assert!(config(1.5).build("optimizer").is_err());
    }

    #[test]
    fn optimizes_quadratic() {
        check_optimizes_quadratic(&OptimizerConfig::MultiStep(config(4.0)), 200, 0.2);
    }
}
