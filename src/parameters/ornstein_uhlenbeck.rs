//! Ornstein-Uhlenbeck process parameter
use super::{cast, Parameter, ParameterBounds};
use crate::specs::TensorType;
use crate::{Prng, TensorforceError};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Configuration of an [`OrnsteinUhlenbeck`] parameter.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrnsteinUhlenbeckConfig {
    /// Rate of mean reversion.
    pub theta: f64,
    /// Scale of the per-step noise.
    pub sigma: f64,
    /// Long-run mean, and the initial value of the process.
    pub mu: f64,
    /// Take the absolute value of every updated position.
    pub absolute: bool,
}

impl Default for OrnsteinUhlenbeckConfig {
    fn default() -> Self {
        Self {
            theta: 0.15,
            sigma: 0.3,
            mu: 0.0,
            absolute: false,
        }
    }
}

impl OrnsteinUhlenbeckConfig {
    /// Build the parameter.
    ///
    /// # Errors
    /// If `theta` or `sigma` is negative or not finite.
    pub fn build(
        &self,
        name: &str,
        bounds: ParameterBounds,
    ) -> Result<OrnsteinUhlenbeck, TensorforceError> {
        if !(self.theta >= 0.0 && self.theta.is_finite()) {
            return Err(TensorforceError::value(name, "theta", self.theta, ">= 0.0"));
        }
        if !(self.sigma >= 0.0 && self.sigma.is_finite()) {
            return Err(TensorforceError::value(name, "sigma", self.sigma, ">= 0.0"));
        }
        if !self.mu.is_finite() {
            return Err(TensorforceError::value(name, "mu", self.mu, "finite"));
        }
        Ok(OrnsteinUhlenbeck {
            config: *self,
            bounds,
            process: self.mu,
        })
    }
}

/// Stochastic parameter following an Ornstein-Uhlenbeck process.
///
/// Each requested value advances the process by one step:
/// `process += theta * (mu - process) + sigma * N(0, 1)`.
/// With `absolute`, the update instead assigns `|process + delta|`, so the process itself
/// (not just the returned value) stays non-negative.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OrnsteinUhlenbeck {
    config: OrnsteinUhlenbeckConfig,
    bounds: ParameterBounds,
    /// Current (non-trainable) state of the process.
    process: f64,
}

impl OrnsteinUhlenbeck {
    /// Current state of the process, without advancing it.
    pub const fn process(&self) -> f64 {
        self.process
    }
}

impl Parameter for OrnsteinUhlenbeck {
    fn value(&mut self, _timestep: u64, rng: &mut Prng) -> f64 {
        let OrnsteinUhlenbeckConfig {
            theta,
            sigma,
            mu,
            absolute,
        } = self.config;
        let noise: f64 = rng.sample(StandardNormal);
        let delta = theta * (mu - self.process) + sigma * noise;
        if absolute {
            self.process = (self.process + delta).abs();
        } else {
            self.process += delta;
        }
        cast(self.bounds.dtype, self.process)
    }

    fn dtype(&self) -> TensorType {
        self.bounds.dtype
    }

    fn min_value(&self) -> Option<f64> {
        if self.config.absolute {
            Some(0.0)
        } else {
            self.bounds.min_value
        }
    }

    fn max_value(&self) -> Option<f64> {
        self.bounds.max_value
    }

    fn final_value(&self) -> f64 {
        cast(self.bounds.dtype, self.config.mu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn degenerate_process_stays_at_mu() {
        let config = OrnsteinUhlenbeckConfig {
            theta: 0.0,
            sigma: 0.0,
            mu: 0.7,
            absolute: false,
        };
        let mut parameter = config.build("noise", ParameterBounds::float()).unwrap();
        let mut rng = Prng::seed_from_u64(1);
        for t in 0..100 {
            assert_eq!(parameter.value(t, &mut rng), cast(TensorType::Float, 0.7));
        }
    }

    #[test]
    fn absolute_values_are_non_negative() {
        let config = OrnsteinUhlenbeckConfig {
            theta: 0.15,
            sigma: 1.0,
            mu: -0.5,
            absolute: true,
        };
        let mut parameter = config.build("noise", ParameterBounds::float()).unwrap();
        assert_eq!(parameter.min_value(), Some(0.0));
        let mut rng = Prng::seed_from_u64(2);
        for t in 0..1000 {
            assert!(parameter.value(t, &mut rng) >= 0.0);
        }
    }

    #[test]
    fn absolute_reflects_the_process() {
        // One step from mu = 0 with theta = 0: the process is |sigma * noise|, and the next
        // step starts from that reflected position.
        let config = OrnsteinUhlenbeckConfig {
            theta: 0.0,
            sigma: 1.0,
            mu: 0.0,
            absolute: true,
        };
        let mut reflected = config.build("noise", ParameterBounds::float()).unwrap();
        let mut free = OrnsteinUhlenbeckConfig {
            absolute: false,
            ..config
        }
        .build("noise", ParameterBounds::float())
        .unwrap();

        let mut rng_a = Prng::seed_from_u64(3);
        let mut rng_b = Prng::seed_from_u64(3);
        let a = reflected.value(0, &mut rng_a);
        let b = free.value(0, &mut rng_b);
        assert!((a - b.abs()).abs() < 1e-6);
        assert!((reflected.process() - free.process().abs()).abs() < 1e-12);
    }

    #[test]
    fn final_value_is_mu() {
        let config = OrnsteinUhlenbeckConfig {
            mu: 0.25,
            ..OrnsteinUhlenbeckConfig::default()
        };
        let parameter = config.build("noise", ParameterBounds::float()).unwrap();
        assert_eq!(parameter.final_value(), 0.25);
        assert_eq!(parameter.min_value(), None);
    }

    #[test]
    fn negative_sigma_fails() {
        let config = OrnsteinUhlenbeckConfig {
            sigma: -1.0,
            ..OrnsteinUhlenbeckConfig::default()
        };
        assert!(config.build("noise", ParameterBounds::float()).is_err());
    }
}
