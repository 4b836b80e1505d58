//! Parameter schedules as functions of the global timestep.
use super::{cast, Parameter, ParameterBounds};
use crate::specs::TensorType;
use crate::{Prng, TensorforceError};
use serde::{Deserialize, Serialize};

/// Configuration of a [`Linear`] schedule.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConfig {
    pub initial_value: f64,
    pub final_value: f64,
    /// Number of timesteps to reach `final_value`.
    pub num_steps: u64,
}

impl LinearConfig {
    /// Build the schedule.
    ///
    /// # Errors
    /// If either end value violates the bounds or `num_steps` is zero.
    pub fn build(&self, name: &str, bounds: ParameterBounds) -> Result<Linear, TensorforceError> {
        bounds.check(name, "initial_value", self.initial_value)?;
        bounds.check(name, "final_value", self.final_value)?;
        if self.num_steps == 0 {
            return Err(TensorforceError::value(name, "num_steps", 0, "> 0"));
        }
        Ok(Linear {
            config: *self,
            bounds,
        })
    }
}

/// Value interpolated linearly from an initial to a final value, then held constant.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Linear {
    config: LinearConfig,
    bounds: ParameterBounds,
}

impl Parameter for Linear {
    #[allow(clippy::cast_precision_loss)]
    fn value(&mut self, timestep: u64, _rng: &mut Prng) -> f64 {
        let LinearConfig {
            initial_value,
            final_value,
            num_steps,
        } = self.config;
        let progress = (timestep as f64 / num_steps as f64).min(1.0);
        cast(
            self.bounds.dtype,
            progress * (final_value - initial_value) + initial_value,
        )
    }

    fn dtype(&self) -> TensorType {
        self.bounds.dtype
    }

    fn min_value(&self) -> Option<f64> {
        self.bounds.min_value
    }

    fn max_value(&self) -> Option<f64> {
        self.bounds.max_value
    }

    fn final_value(&self) -> f64 {
        cast(self.bounds.dtype, self.config.final_value)
    }
}

/// Configuration of an [`Exponential`] decay schedule.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialConfig {
    pub initial_value: f64,
    /// Multiplicative decay per `decay_steps` timesteps, in `(0, 1]`.
    pub decay_rate: f64,
    pub decay_steps: u64,
    /// Decay in discrete jumps every `decay_steps` timesteps.
    #[serde(default)]
    pub staircase: bool,
}

impl ExponentialConfig {
    /// Build the schedule.
    ///
    /// # Errors
    /// If the initial value violates the bounds or the decay is not in `(0, 1]`.
    pub fn build(
        &self,
        name: &str,
        bounds: ParameterBounds,
    ) -> Result<Exponential, TensorforceError> {
        bounds.check(name, "initial_value", self.initial_value)?;
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return Err(TensorforceError::value(
                name,
                "decay_rate",
                self.decay_rate,
                "0.0 < decay_rate <= 1.0",
            ));
        }
        if self.decay_steps == 0 {
            return Err(TensorforceError::value(name, "decay_steps", 0, "> 0"));
        }
        Ok(Exponential {
            config: *self,
            bounds,
        })
    }
}

/// Value decaying exponentially from an initial value towards zero.
///
/// Values never go below the declared minimum.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Exponential {
    config: ExponentialConfig,
    bounds: ParameterBounds,
}

impl Parameter for Exponential {
    #[allow(clippy::cast_precision_loss)]
    fn value(&mut self, timestep: u64, _rng: &mut Prng) -> f64 {
        let mut exponent = timestep as f64 / self.config.decay_steps as f64;
        if self.config.staircase {
            exponent = exponent.floor();
        }
        let value = self.config.initial_value * self.config.decay_rate.powf(exponent);
        let value = self.bounds.min_value.map_or(value, |min| value.max(min));
        cast(self.bounds.dtype, value)
    }

    fn dtype(&self) -> TensorType {
        self.bounds.dtype
    }

    fn min_value(&self) -> Option<f64> {
        self.bounds.min_value
    }

    fn max_value(&self) -> Option<f64> {
        self.bounds.max_value
    }

    fn final_value(&self) -> f64 {
        let value = if self.config.decay_rate < 1.0 {
            0.0
        } else {
            self.config.initial_value
        };
        cast(
            self.bounds.dtype,
            self.bounds.min_value.map_or(value, |min| value.max(min)),
        )
    }
}
