//! Parameters: possibly time-varying scalar values resolved fresh at each use.
//!
//! Hyperparameters such as learning rates, sample counts and sampling temperatures are
//! parameters. A parameter is configured with a [`ParameterConfig`] and built for a declared
//! type and value range ([`ParameterBounds`]) by the module that owns it.
mod constant;
mod decaying;
mod ornstein_uhlenbeck;

pub use constant::Constant;
pub use decaying::{Exponential, ExponentialConfig, Linear, LinearConfig};
pub use ornstein_uhlenbeck::{OrnsteinUhlenbeck, OrnsteinUhlenbeckConfig};

use crate::specs::TensorType;
use crate::{Prng, TensorforceError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar value resolved at each use.
pub trait Parameter: fmt::Debug {
    /// Resolve the value at the given global timestep.
    ///
    /// Stochastic parameters advance their internal state on every call.
    /// The value is cast to [`Parameter::dtype`] (ints are rounded, bools are 0 or 1).
    fn value(&mut self, timestep: u64, rng: &mut Prng) -> f64;

    /// Declared type of the value.
    fn dtype(&self) -> TensorType;

    /// Lower bound on the values, if any.
    fn min_value(&self) -> Option<f64>;

    /// Upper bound on the values, if any.
    fn max_value(&self) -> Option<f64>;

    /// Asymptotic value, for introspection and summaries.
    fn final_value(&self) -> f64;

    /// The value if it never changes.
    fn constant_value(&self) -> Option<f64> {
        None
    }
}

/// Declared type and value range of a parameter, provided by the owning module.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ParameterBounds {
    pub dtype: TensorType,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl ParameterBounds {
    pub const fn float() -> Self {
        Self {
            dtype: TensorType::Float,
            min_value: None,
            max_value: None,
        }
    }

    pub const fn int() -> Self {
        Self {
            dtype: TensorType::Int,
            min_value: None,
            max_value: None,
        }
    }

    #[must_use]
    pub const fn with_min(mut self, min_value: f64) -> Self {
        self.min_value = Some(min_value);
        self
    }

    #[must_use]
    pub const fn with_max(mut self, max_value: f64) -> Self {
        self.max_value = Some(max_value);
        self
    }

    /// Check that a configured value lies within the bounds and has the declared type.
    ///
    /// # Errors
    /// If the value is out of range or not integral for an int parameter.
    pub fn check(&self, name: &str, argument: &str, value: f64) -> Result<(), TensorforceError> {
        if let Some(min_value) = self.min_value {
            if value < min_value {
                return Err(TensorforceError::value(
                    name,
                    argument,
                    value,
                    format!(">= {}", min_value),
                ));
            }
        }
        if let Some(max_value) = self.max_value {
            if value > max_value {
                return Err(TensorforceError::value(
                    name,
                    argument,
                    value,
                    format!("<= {}", max_value),
                ));
            }
        }
        if !value.is_finite() {
            return Err(TensorforceError::value(name, argument, value, "finite"));
        }
        if self.dtype == TensorType::Int && value.fract() != 0.0 {
            return Err(TensorforceError::value(name, argument, value, "integer"));
        }
        Ok(())
    }
}

/// Cast a value to the representation of the given type.
pub fn cast(dtype: TensorType, value: f64) -> f64 {
    match dtype {
        TensorType::Bool => {
            if value != 0.0 {
                1.0
            } else {
                0.0
            }
        }
        TensorType::Int => value.round(),
        TensorType::Float => f64::from(value as f32),
    }
}

/// Parameter configuration: a plain number (constant) or a parameter module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterConfig {
    Value(f64),
    Module(ParameterModuleConfig),
}

/// Parameter module configuration, selected by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterModuleConfig {
    Constant { value: f64 },
    Linear(LinearConfig),
    Exponential(ExponentialConfig),
    OrnsteinUhlenbeck(OrnsteinUhlenbeckConfig),
}

impl From<f64> for ParameterConfig {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl ParameterConfig {
    /// The configured value if this is a constant.
    pub const fn as_constant(&self) -> Option<f64> {
        match self {
            Self::Value(value) | Self::Module(ParameterModuleConfig::Constant { value }) => {
                Some(*value)
            }
            Self::Module(_) => None,
        }
    }

    /// Build the parameter for the given declared bounds.
    ///
    /// # Args
    /// * `name` - Name of the parameter, used in error messages.
    /// * `bounds` - Declared type and value range.
    ///
    /// # Errors
    /// If configured values violate the declared bounds.
    pub fn build(
        &self,
        name: &str,
        bounds: ParameterBounds,
    ) -> Result<Box<dyn Parameter>, TensorforceError> {
        match self {
            Self::Value(value) | Self::Module(ParameterModuleConfig::Constant { value }) => {
                Ok(Box::new(Constant::new(name, *value, bounds)?))
            }
            Self::Module(ParameterModuleConfig::Linear(config)) => {
                Ok(Box::new(config.build(name, bounds)?))
            }
            Self::Module(ParameterModuleConfig::Exponential(config)) => {
                Ok(Box::new(config.build(name, bounds)?))
            }
            Self::Module(ParameterModuleConfig::OrnsteinUhlenbeck(config)) => {
                Ok(Box::new(config.build(name, bounds)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn deserialize_plain_number() {
        let config: ParameterConfig = serde_json::from_str("0.5").unwrap();
        assert_eq!(config, ParameterConfig::Value(0.5));
        assert_eq!(config.as_constant(), Some(0.5));
    }

    #[test]
    fn deserialize_module() {
        let config: ParameterConfig = serde_json::from_str(
            r#"{"type": "linear", "initial_value": 1.0, "final_value": 0.0, "num_steps": 10}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            ParameterConfig::Module(ParameterModuleConfig::Linear(LinearConfig {
                initial_value: 1.0,
                final_value: 0.0,
                num_steps: 10,
            }))
        );
        assert_eq!(config.as_constant(), None);
    }

    #[test]
    fn deserialize_ornstein_uhlenbeck_defaults() {
        let config: ParameterConfig =
            serde_json::from_str(r#"{"type": "ornstein_uhlenbeck", "absolute": true}"#).unwrap();
        let expected = OrnsteinUhlenbeckConfig {
            absolute: true,
            ..OrnsteinUhlenbeckConfig::default()
        };
        assert_eq!(
            config,
            ParameterConfig::Module(ParameterModuleConfig::OrnsteinUhlenbeck(expected))
        );
    }

    #[test]
    fn constant_out_of_bounds_fails() {
        let config = ParameterConfig::from(1.5);
        let bounds = ParameterBounds::float().with_min(0.0).with_max(1.0);
        assert!(matches!(
            config.build("fraction", bounds),
            Err(TensorforceError::Value { .. })
        ));
    }

    #[test]
    fn int_parameter_requires_integral_value() {
        let bounds = ParameterBounds::int().with_min(0.0);
        assert!(ParameterConfig::from(2.5).build("num_samples", bounds).is_err());
        let mut parameter = ParameterConfig::from(3.0)
            .build("num_samples", bounds)
            .unwrap();
        let mut rng = Prng::seed_from_u64(0);
        assert_eq!(parameter.value(0, &mut rng), 3.0);
        assert_eq!(parameter.constant_value(), Some(3.0));
    }

    #[test]
    fn cast_rounds_ints() {
        assert_eq!(cast(TensorType::Int, 2.6), 3.0);
        assert_eq!(cast(TensorType::Bool, 0.2), 1.0);
        assert_eq!(cast(TensorType::Float, 0.25), 0.25);
    }
}
