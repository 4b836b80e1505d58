//! Tensor specifications for states, actions, internals and module outputs.
use crate::TensorforceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a tensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorType {
    Bool,
    Int,
    Float,
}

impl TensorType {
    /// Whether values of this type are discrete (bool or int).
    #[must_use]
    pub const fn is_discrete(self) -> bool {
        matches!(self, Self::Bool | Self::Int)
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
        }
    }
}

/// Specification of a (per-instance, unbatched) tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    #[serde(rename = "type")]
    pub dtype: TensorType,
    #[serde(default)]
    pub shape: Vec<usize>,
    /// Number of values of an int tensor, `0..num_values`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_values: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl TensorSpec {
    pub fn bool(shape: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype: TensorType::Bool,
            shape: shape.into(),
            num_values: None,
            min_value: None,
            max_value: None,
        }
    }

    pub fn int(shape: impl Into<Vec<usize>>, num_values: usize) -> Self {
        Self {
            dtype: TensorType::Int,
            shape: shape.into(),
            num_values: Some(num_values),
            min_value: None,
            max_value: None,
        }
    }

    pub fn float(shape: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype: TensorType::Float,
            shape: shape.into(),
            num_values: None,
            min_value: None,
            max_value: None,
        }
    }

    /// Float tensor with values in `[min_value, max_value]`.
    pub fn bounded_float(shape: impl Into<Vec<usize>>, min_value: f64, max_value: f64) -> Self {
        Self {
            min_value: Some(min_value),
            max_value: Some(max_value),
            ..Self::float(shape)
        }
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether both value bounds are given.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.min_value.is_some() && self.max_value.is_some()
    }

    /// The same spec with a different shape.
    #[must_use]
    pub fn with_shape(&self, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            shape: shape.into(),
            ..self.clone()
        }
    }

    /// Check internal consistency of the specification.
    ///
    /// # Errors
    /// If an int spec has no positive `num_values` or the float bounds are inconsistent.
    pub fn validate(&self, name: &str) -> Result<(), TensorforceError> {
        match self.dtype {
            TensorType::Int => match self.num_values {
                Some(n) if n >= 1 => {}
                num_values => {
                    return Err(TensorforceError::value(
                        name,
                        "num_values",
                        format!("{:?}", num_values),
                        ">= 1 required for int",
                    ))
                }
            },
            TensorType::Float => match (self.min_value, self.max_value) {
                (Some(low), Some(high)) if low >= high => {
                    return Err(TensorforceError::value(
                        name,
                        "min_value",
                        low,
                        format!("< max_value {}", high),
                    ))
                }
                (Some(_), None) | (None, Some(_)) => {
                    return Err(TensorforceError::value(
                        name,
                        "min_value/max_value",
                        "one bound",
                        "both or neither",
                    ))
                }
                _ => {}
            },
            TensorType::Bool => {}
        }
        Ok(())
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_action_spec() {
        let spec: TensorSpec =
            serde_json::from_str(r#"{"type": "int", "shape": [2], "num_values": 3}"#).unwrap();
        assert_eq!(spec, TensorSpec::int([2], 3));
        assert_eq!(spec.rank(), 1);
        assert_eq!(spec.size(), 2);
    }

    #[test]
    fn scalar_shape_defaults() {
        let spec: TensorSpec = serde_json::from_str(r#"{"type": "bool"}"#).unwrap();
        assert_eq!(spec.rank(), 0);
        assert_eq!(spec.size(), 1);
    }

    #[test]
    fn validate_int_requires_num_values() {
        let mut spec = TensorSpec::int([], 2);
        assert!(spec.validate("action").is_ok());
        spec.num_values = None;
        assert!(spec.validate("action").is_err());
    }

    #[test]
    fn validate_bounds() {
        assert!(TensorSpec::bounded_float([1], -1.0, 1.0)
            .validate("action")
            .is_ok());
        assert!(TensorSpec::bounded_float([1], 1.0, 1.0)
            .validate("action")
            .is_err());
        let mut half = TensorSpec::float([1]);
        half.min_value = Some(0.0);
        assert!(half.validate("action").is_err());
    }
}
