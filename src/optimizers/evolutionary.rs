//! Evolutionary (random perturbation) optimizer
use super::{Deltas, Optimizer, StepInputs};
use crate::logging::StatsLogger;
use crate::parameters::{Parameter, ParameterBounds, ParameterConfig};
use crate::tensors::Variable;
use crate::utils::numeric::sign;
use crate::{Prng, TensorforceError};
use log::debug;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Configuration for [`Evolutionary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionaryConfig {
    /// Scale of the sampled perturbations (float >= 0).
    pub learning_rate: ParameterConfig,
    /// Number of sampled perturbations per step (int >= 0).
    #[serde(default = "default_num_samples")]
    pub num_samples: ParameterConfig,
    /// Fix the number of samples at construction; requires a constant `num_samples`.
    #[serde(default)]
    pub unroll_loop: bool,
}

const fn default_num_samples() -> ParameterConfig {
    ParameterConfig::Value(1.0)
}

impl EvolutionaryConfig {
    pub const fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate: ParameterConfig::Value(learning_rate),
            num_samples: default_num_samples(),
            unroll_loop: false,
        }
    }

    /// # Errors
    /// If a hyperparameter is out of range, or `unroll_loop` is set with a non-constant
    /// `num_samples`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn build(&self, name: &str) -> Result<Evolutionary, TensorforceError> {
        let learning_rate = self.learning_rate.build(
            &format!("{}/learning_rate", name),
            ParameterBounds::float().with_min(0.0),
        )?;
        let num_samples = if self.unroll_loop {
            match self.num_samples.as_constant() {
                Some(n) if n >= 0.0 && n.fract() == 0.0 => NumSamples::Fixed(n as usize),
                _ => {
                    return Err(TensorforceError::value(
                        name,
                        "num_samples",
                        format!("{:?}", self.num_samples),
                        "constant int >= 0 when unroll_loop is set",
                    ))
                }
            }
        } else {
            NumSamples::Scheduled(self.num_samples.build(
                &format!("{}/num_samples", name),
                ParameterBounds::int().with_min(0.0),
            )?)
        };
        Ok(Evolutionary {
            learning_rate,
            num_samples,
        })
    }
}

#[derive(Debug)]
enum NumSamples {
    Fixed(usize),
    Scheduled(Box<dyn Parameter>),
}

/// Evolutionary optimizer.
///
/// Samples random perturbations of the variables and moves in the direction of each
/// perturbation that improves the loss (and against each one that worsens it).
#[derive(Debug)]
pub struct Evolutionary {
    learning_rate: Box<dyn Parameter>,
    num_samples: NumSamples,
}

impl Evolutionary {
    /// Apply `perturbations - previous` to the variables.
    fn perturb(
        variables: &[Variable],
        perturbations: &[ArrayD<f32>],
        previous: &[ArrayD<f32>],
    ) -> Result<(), TensorforceError> {
        for ((variable, perturbation), previous) in
            variables.iter().zip(perturbations).zip(previous)
        {
            variable.assign_add(&(perturbation - previous))?;
        }
        Ok(())
    }

    /// Perturbation loop; on success the last perturbation remains applied.
    fn sample(
        inputs: StepInputs,
        learning_rate: f32,
        num_samples: usize,
        applied: &mut Vec<ArrayD<f32>>,
        rng: &mut Prng,
    ) -> Result<Vec<ArrayD<f32>>, TensorforceError> {
        let StepInputs {
            arguments,
            variables,
            objective,
        } = inputs;
        let reference = objective.reference(arguments)?;
        let unperturbed_loss = objective.comparative_loss(arguments, &reference)?;

        let mut deltas: Vec<_> = variables.iter().map(Variable::zeros_like).collect();
        for _ in 0..num_samples {
            let perturbations: Vec<ArrayD<f32>> = variables
                .iter()
                .map(|v| {
                    ArrayD::from_shape_simple_fn(IxDyn(&v.shape()), || {
                        learning_rate * rng.sample::<f32, _>(StandardNormal)
                    })
                })
                .collect();
            Self::perturb(variables, &perturbations, applied)?;
            *applied = perturbations;

            let perturbed_loss = objective.comparative_loss(arguments, &reference)?;
            let direction = sign(unperturbed_loss - perturbed_loss);
            for (delta, perturbation) in deltas.iter_mut().zip(applied.iter()) {
                delta.scaled_add(direction, perturbation);
            }
        }
        Ok(deltas)
    }
}

impl Optimizer for Evolutionary {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn step(
        &mut self,
        inputs: StepInputs,
        timestep: u64,
        rng: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> Result<Deltas, TensorforceError> {
        let learning_rate = self.learning_rate.value(timestep, rng) as f32;
        let num_samples = match &mut self.num_samples {
            NumSamples::Fixed(n) => *n,
            NumSamples::Scheduled(parameter) => parameter.value(timestep, rng).max(0.0) as usize,
        };
        logger.log_scalar("evolutionary/num_samples", num_samples as f64);
        if num_samples == 0 {
            debug!("evolutionary step with no samples");
            return Ok(inputs.zero_deltas());
        }

        let variables = inputs.variables;
        let mut applied: Vec<_> = variables.iter().map(Variable::zeros_like).collect();
        let mut deltas = match Self::sample(inputs, learning_rate, num_samples, &mut applied, rng) {
            Ok(deltas) => deltas,
            Err(error) => {
                // Remove the perturbation that is still applied
                let zeros: Vec<_> = variables.iter().map(Variable::zeros_like).collect();
                Self::perturb(variables, &zeros, &applied)?;
                return Err(error);
            }
        };

        let scale = (num_samples as f32).recip();
        for delta in &mut deltas {
            *delta *= scale;
        }
        Self::perturb(variables, &deltas, &applied)?;

        let norm: f32 = deltas.iter().flatten().map(|x| x * x).sum::<f32>().sqrt();
        logger.log_scalar("evolutionary/delta_norm", norm.into());

        Ok(variables
            .iter()
            .map(|v| v.name().to_owned())
            .zip(deltas)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check_optimizes_quadratic, Quadratic};
    use super::super::{Objective, OptimizerConfig};
    use super::*;
    use crate::logging::{Summary, SummaryLogger};
    use crate::tensors::{Arguments, VarStore};
    use ndarray::{arr1, Ix1};
    use rand::SeedableRng;

    /// `(x - 1)^2` of a scalar variable, counting evaluations.
    struct Shifted {
        x: Variable,
    }

    impl Objective for Shifted {
        fn loss(&self, _arguments: &Arguments) -> Result<f32, TensorforceError> {
            let x = self.x.value().into_dimensionality::<Ix1>()?;
            Ok((x[0] - 1.0).powi(2))
        }
    }

    fn step(
        config: &EvolutionaryConfig,
        objective: &dyn Objective,
        vs: &VarStore,
        seed: u64,
    ) -> Result<Deltas, TensorforceError> {
        let mut optimizer = config.build("optimizer")?;
        let arguments = Arguments::new();
        let inputs = StepInputs {
            arguments: &arguments,
            variables: vs.variables(),
            objective,
        };
        optimizer.step(inputs, 0, &mut Prng::seed_from_u64(seed), &mut ())
    }

    #[test]
    fn logs_step_statistics() {
        let mut vs = VarStore::new();
        let objective = Quadratic::new(&mut vs);
        let config = EvolutionaryConfig {
            num_samples: 4.0.into(),
            ..EvolutionaryConfig::new(0.1)
        };
        let mut optimizer = config.build("optimizer").unwrap();
        let arguments = Arguments::new();
        let inputs = StepInputs {
            arguments: &arguments,
            variables: vs.variables(),
            objective: &objective,
        };
        let mut rng = Prng::seed_from_u64(0);
        let mut logger = SummaryLogger::new(Vec::new());
        for timestep in 0..3 {
            optimizer.step(inputs, timestep, &mut rng, &mut logger).unwrap();
        }
        logger.flush();

        let written = logger.writer();
        let ids: Vec<_> = written.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["evolutionary/delta_norm", "evolutionary/num_samples"]);
        match &written[1].1 {
            Summary::Scalar(stats) => {
                assert_eq!(stats.count(), 3);
                assert_eq!(stats.mean(), Some(4.0));
            }
            summary => panic!("unexpected summary {:?}", summary),
        }
    }

    #[test]
    fn deserialize_defaults() {
        let config: OptimizerConfig =
            serde_json::from_str(r#"{"type": "evolutionary", "learning_rate": 0.1}"#).unwrap();
        assert_eq!(config, OptimizerConfig::Evolutionary(EvolutionaryConfig::new(0.1)));
    }

    #[test]
    fn learning_rate_required() {
        assert!(serde_json::from_str::<OptimizerConfig>(r#"{"type": "evolutionary"}"#).is_err());
    }

    #[test]
    fn negative_learning_rate_fails() {
        assert!(EvolutionaryConfig::new(-1.0).build("optimizer").is_err());
    }

    #[test]
    fn unroll_loop_requires_constant() {
        let config: EvolutionaryConfig = serde_json::from_str(
            r#"{
                "learning_rate": 0.1,
                "num_samples": {"type": "linear", "initial_value": 1, "final_value": 5, "num_steps": 10},
                "unroll_loop": true
            }"#,
        )
        .unwrap();
        assert!(matches!(
            config.build("optimizer"),
            Err(TensorforceError::Value { .. })
        ));
        let config = EvolutionaryConfig {
            num_samples: 2.5.into(),
            unroll_loop: true,
            ..EvolutionaryConfig::new(0.1)
        };
        assert!(config.build("optimizer").is_err());
        let config = EvolutionaryConfig {
            num_samples: 3.0.into(),
            unroll_loop: true,
            ..EvolutionaryConfig::new(0.1)
        };
        assert!(config.build("optimizer").is_ok());
    }

    #[test]
    fn zero_samples_is_noop() {
        let mut vs = VarStore::new();
        let objective = Quadratic::new(&mut vs);
        objective.x.assign(&arr1(&[0.5_f32, -0.5]).into_dyn()).unwrap();
        let config = EvolutionaryConfig {
            num_samples: 0.0.into(),
            ..EvolutionaryConfig::new(1.0)
        };
        let deltas = step(&config, &objective, &vs, 0).unwrap();
        assert_eq!(deltas.keys().collect::<Vec<_>>(), ["x"]);
        assert!(deltas.values().flatten().all(|&d| d == 0.0));
        assert_eq!(objective.x.value(), arr1(&[0.5_f32, -0.5]).into_dyn());
    }

    #[test]
    fn applies_exactly_the_averaged_delta() {
        let mut vs = VarStore::new();
        let objective = Quadratic::new(&mut vs);
        let initial = arr1(&[0.3_f32, 0.7]).into_dyn();
        objective.x.assign(&initial).unwrap();
        let config = EvolutionaryConfig {
            num_samples: 50.0.into(),
            ..EvolutionaryConfig::new(0.5)
        };
        let deltas = step(&config, &objective, &vs, 1).unwrap();
        let delta = deltas.get("x").unwrap();
        let difference = objective.x.value() - (&initial + delta);
        assert!(difference.iter().all(|d| d.abs() < 1e-5), "{}", difference);
    }

    #[test]
    fn unrolled_matches_scheduled() {
        let config = EvolutionaryConfig {
            num_samples: 4.0.into(),
            ..EvolutionaryConfig::new(0.1)
        };
        let unrolled = EvolutionaryConfig {
            unroll_loop: true,
            ..config.clone()
        };
        let mut deltas = Vec::new();
        for config in [config, unrolled] {
            let mut vs = VarStore::new();
            let objective = Quadratic::new(&mut vs);
            deltas.push(step(&config, &objective, &vs, 7).unwrap());
        }
        assert_eq!(deltas[0], deltas[1]);
    }

    #[test]
    fn descends_scalar_quadratic() {
        let mut vs = VarStore::new();
        let x = vs.zeros("x", &[1]).unwrap();
        let objective = Shifted { x };
        let config = EvolutionaryConfig {
            num_samples: 100.0.into(),
            ..EvolutionaryConfig::new(0.1)
        };
        let deltas = step(&config, &objective, &vs, 3).unwrap();
        // The gradient at 0 is -2
        assert!(deltas.get("x").unwrap()[[0]] > 0.0);
    }

    #[test]
    fn error_restores_variables() {
        struct Failing {
            x: Variable,
        }
        impl Objective for Failing {
            fn loss(&self, _arguments: &Arguments) -> Result<f32, TensorforceError> {
                if self.x.value().iter().all(|&v| v == 0.0) {
                    Ok(0.0)
                } else {
                    Err(TensorforceError::invalid("failing", "x"))
                }
            }
        }
        let mut vs = VarStore::new();
        let objective = Failing {
            x: vs.zeros("x", &[3]).unwrap(),
        };
        let result = step(&EvolutionaryConfig::new(1.0), &objective, &vs, 0);
        assert!(result.is_err());
        assert!(objective.x.value().iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn optimizes_quadratic() {
        let config = EvolutionaryConfig {
            num_samples: 20.0.into(),
            ..EvolutionaryConfig::new(0.05)
        };
        check_optimizes_quadratic(&config.into(), 500, 0.2);
    }
}
