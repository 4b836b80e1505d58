//! Error type
use thiserror::Error;

/// Error from building or executing a module.
///
/// `name` identifies the module raising the error and `argument` the offending argument.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorforceError {
    /// Malformed, out-of-range or unsupported argument value.
    #[error("invalid value for {name} argument {argument}: {value} ({hint})")]
    Value {
        name: String,
        argument: String,
        value: String,
        hint: String,
    },
    /// Argument has the wrong data type.
    #[error("invalid type for {name} argument {argument}: {dtype}")]
    Type {
        name: String,
        argument: String,
        dtype: String,
    },
    /// Argument is not supported in this context.
    #[error("invalid {name} argument {argument}")]
    Invalid { name: String, argument: String },
    /// Required argument is missing.
    #[error("missing required {name} argument {argument}")]
    Required { name: String, argument: String },
    /// Two values that must agree (key sets, shapes) do not.
    #[error("mismatch for {name} argument {argument}: expected {expected}, got {actual}")]
    Mismatch {
        name: String,
        argument: String,
        expected: String,
        actual: String,
    },
}

impl TensorforceError {
    pub fn value(
        name: impl Into<String>,
        argument: impl Into<String>,
        value: impl ToString,
        hint: impl Into<String>,
    ) -> Self {
        Self::Value {
            name: name.into(),
            argument: argument.into(),
            value: value.to_string(),
            hint: hint.into(),
        }
    }

    pub fn dtype(
        name: impl Into<String>,
        argument: impl Into<String>,
        dtype: impl ToString,
    ) -> Self {
        Self::Type {
            name: name.into(),
            argument: argument.into(),
            dtype: dtype.to_string(),
        }
    }

    pub fn invalid(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            argument: argument.into(),
        }
    }

    pub fn required(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::Required {
            name: name.into(),
            argument: argument.into(),
        }
    }

    pub fn mismatch(
        name: impl Into<String>,
        argument: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::Mismatch {
            name: name.into(),
            argument: argument.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for TensorforceError {
    fn from(error: ndarray::ShapeError) -> Self {
        Self::mismatch("tensor", "shape", "compatible shapes", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_message() {
        let error = TensorforceError::value("AutoNetwork", "input rank", 4, "<= 3");
        assert_eq!(
            error.to_string(),
            "invalid value for AutoNetwork argument input rank: 4 (<= 3)"
        );
    }

    #[test]
    fn shape_error_converts_to_mismatch() {
        let error: TensorforceError =
            ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into();
        assert!(matches!(error, TensorforceError::Mismatch { .. }));
    }
}
