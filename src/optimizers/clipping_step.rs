//! Clipping update modifier
use super::{apply_deltas, Deltas, Optimizer, OptimizerConfig, StepInputs};
use crate::logging::StatsLogger;
use crate::parameters::{Parameter, ParameterBounds, ParameterConfig};
use crate::{Prng, TensorforceError};
use serde::{Deserialize, Serialize};

/// How deltas are clipped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClippingMode {
    /// Rescale all deltas together to a maximum joint L2 norm.
    GlobalNorm,
    /// Rescale each delta to a maximum L2 norm.
    Norm,
    /// Clip each element to `[-threshold, threshold]`.
    Value,
}

impl Default for ClippingMode {
    fn default() -> Self {
        Self::GlobalNorm
    }
}

/// Configuration for [`ClippingStep`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClippingStepConfig {
    /// Wrapped optimizer.
    pub optimizer: Box<OptimizerConfig>,
    /// Clipping threshold (float > 0).
    pub threshold: ParameterConfig,
    #[serde(default)]
    pub mode: ClippingMode,
}

impl ClippingStepConfig {
    /// # Errors
    /// If `threshold` is not positive or the wrapped optimizer fails to build.
    pub fn build(&self, name: &str) -> Result<ClippingStep, TensorforceError> {
        let threshold = self.threshold.build(
            &format!("{}/threshold", name),
            ParameterBounds::float().with_min(0.0),
        )?;
        if threshold.constant_value() == Some(0.0) {
            return Err(TensorforceError::value(name, "threshold", 0, "> 0.0"));
        }
        Ok(ClippingStep {
            optimizer: self.optimizer.build(&format!("{}/optimizer", name))?,
            threshold,
            mode: self.mode,
        })
    }
}

/// Update modifier that clips the deltas of the wrapped optimizer.
#[derive(Debug)]
pub struct ClippingStep {
    optimizer: Box<dyn Optimizer>,
    threshold: Box<dyn Parameter>,
    mode: ClippingMode,
}

fn l2_norm<'a>(values: impl IntoIterator<Item = &'a f32>) -> f32 {
    values.into_iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Clip deltas in place, returning whether any changed.
fn clip(deltas: &mut Deltas, mode: ClippingMode, threshold: f32) -> bool {
    match mode {
        ClippingMode::GlobalNorm => {
            let norm = l2_norm(deltas.values().flatten());
            if norm <= threshold {
                return false;
            }
            let scale = threshold / norm;
            for (_, delta) in deltas.iter_mut() {
                *delta *= scale;
            }
            true
        }
        ClippingMode::Norm => {
            let mut clipped = false;
            for (_, delta) in deltas.iter_mut() {
                let norm = l2_norm(delta.iter());
                if norm > threshold {
                    *delta *= threshold / norm;
                    clipped = true;
                }
            }
            clipped
        }
        ClippingMode::Value => {
            let mut clipped = false;
            for (_, delta) in deltas.iter_mut() {
                delta.mapv_inplace(|x| {
                    let y = x.clamp(-threshold, threshold);
                    clipped |= y != x;
                    y
                });
            }
            clipped
        }
    }
}

impl Optimizer for ClippingStep {
    #[allow(clippy::cast_possible_truncation)]
    fn step(
        &mut self,
        inputs: StepInputs,
        timestep: u64,
        rng: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> Result<Deltas, TensorforceError> {
        let threshold = self.threshold.value(timestep, rng) as f32;
        let deltas = self.optimizer.step(inputs, timestep, rng, logger)?;
        let mut clipped = deltas.clone();
        if clip(&mut clipped, self.mode, threshold) {
            let correction = clipped.try_zip_map(&deltas, "deltas", |_, c, d| Ok(c - d))?;
            apply_deltas(inputs.variables, &correction)?;
            logger.log_scalar("clipping_step/clipped", 1.0);
        } else {
            logger.log_scalar("clipping_step/clipped", 0.0);
        }
        Ok(clipped)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Quadratic;
    use super::super::EvolutionaryConfig;
    use super::*;
    use crate::tensors::{Arguments, VarStore};
    use ndarray::arr1;
    use rand::SeedableRng;
    use rstest::rstest;

    fn deltas(a: [f32; 2], b: [f32; 1]) -> Deltas {
        [("a", arr1(&a).into_dyn()), ("b", arr1(&b).into_dyn())]
            .into_iter()
            .collect()
    }

    #[rstest]
    #[case(ClippingMode::GlobalNorm, deltas([0.6, 0.0], [0.8]))]
    #[case(ClippingMode::Norm, deltas([1.0, 0.0], [1.0]))]
    #[case(ClippingMode::Value, deltas([1.0, 0.0], [1.0]))]
    fn clip_modes(#[case] mode: ClippingMode, #[case] expected: Deltas) {
        let mut values = deltas([3.0, 0.0], [4.0]);
        assert!(clip(&mut values, mode, 1.0));
        for (name, value) in values.iter() {
            let expected = expected.get(name).unwrap();
            assert!((value - expected).iter().all(|d| d.abs() < 1e-6));
        }
    }

    #[test]
    fn below_threshold_unchanged() {
        let mut values = deltas([0.3, 0.0], [0.4]);
        for mode in [ClippingMode::GlobalNorm, ClippingMode::Norm, ClippingMode::Value] {
            assert!(!clip(&mut values, mode, 1.0));
        }
        assert_eq!(values, deltas([0.3, 0.0], [0.4]));
    }

    #[test]
    fn zero_threshold_fails() {
        let config = ClippingStepConfig {
            optimizer: Box::new(EvolutionaryConfig::new(0.1).into()),
            threshold: 0.0.into(),
            mode: ClippingMode::Value,
        };
        assert!(config.build("optimizer").is_err());
    }

    #[test]
    fn deserialize_default_mode() {
        let config: OptimizerConfig = serde_json::from_str(
            r#"{
                "type": "clipping_step",
                "threshold": 0.5,
                "optimizer": {"type": "evolutionary", "learning_rate": 1.0}
            }"#,
        )
        .unwrap();
        match config {
            OptimizerConfig::ClippingStep(config) => assert_eq!(config.mode, ClippingMode::GlobalNorm),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn applies_clipped_delta() {
        let mut vs = VarStore::new();
        let objective = Quadratic::new(&mut vs);
        let config = ClippingStepConfig {
            optimizer: Box::new(
                EvolutionaryConfig {
                    num_samples: 3.0.into(),
                    ..EvolutionaryConfig::new(1.0)
                }
                .into(),
            ),
            threshold: 0.01.into(),
            mode: ClippingMode::Value,
        };
        let mut optimizer = config.build("optimizer").unwrap();
        let arguments = Arguments::new();
        let inputs = StepInputs {
            arguments: &arguments,
            variables: vs.variables(),
            objective: &objective,
        };
        let deltas = optimizer
            .step(inputs, 0, &mut Prng::seed_from_u64(0), &mut ())
            .unwrap();
        let x = objective.x.value();
        assert!(x.iter().all(|v| v.abs() <= 0.01 + 1e-5), "{}", x);
        let difference = x - deltas.get("x").unwrap();
        assert!(difference.iter().all(|d| d.abs() < 1e-5));
    }
}
