use super::{cast, Parameter, ParameterBounds};
use crate::specs::TensorType;
use crate::{Prng, TensorforceError};

/// Parameter with a fixed value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Constant {
    value: f64,
    bounds: ParameterBounds,
}

impl Constant {
    /// Create a constant parameter.
    ///
    /// # Errors
    /// If `value` violates `bounds`.
    pub fn new(name: &str, value: f64, bounds: ParameterBounds) -> Result<Self, TensorforceError> {
        bounds.check(name, "value", value)?;
        Ok(Self {
            value: cast(bounds.dtype, value),
            bounds,
        })
    }
}

impl Parameter for Constant {
    fn value(&mut self, _timestep: u64, _rng: &mut Prng) -> f64 {
        self.value
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
        self.value
    }

    fn constant_value(&self) -> Option<f64> {
        Some(self.value)
    }
}
