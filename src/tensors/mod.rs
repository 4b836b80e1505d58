//! Tensor values, dictionaries and variables.
mod dict;
mod variable;

pub use dict::TensorDict;
pub use variable::{VarStore, Variable};

use crate::specs::TensorType;
use crate::TensorforceError;
use ndarray::{ArrayD, Axis};

/// A batched tensor of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    Bool(ArrayD<bool>),
    Int(ArrayD<i64>),
    Float(ArrayD<f32>),
}

impl Tensor {
    pub const fn dtype(&self) -> TensorType {
        match self {
            Self::Bool(_) => TensorType::Bool,
            Self::Int(_) => TensorType::Int,
            Self::Float(_) => TensorType::Float,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Bool(x) => x.shape(),
            Self::Int(x) => x.shape(),
            Self::Float(x) => x.shape(),
        }
    }

    /// Size of the leading (batch) axis, if any.
    pub fn batch_size(&self) -> Option<usize> {
        self.shape().first().copied()
    }

    /// Gather entries along the batch axis. Indices may repeat.
    ///
    /// # Errors
    /// If the tensor is a scalar or an index is out of bounds.
    pub fn gather(&self, indices: &[usize]) -> Result<Self, TensorforceError> {
        let batch_size = self.batch_size().ok_or_else(|| {
            TensorforceError::value("gather", "tensor rank", 0, "batch axis required")
        })?;
        if let Some(index) = indices.iter().find(|&&i| i >= batch_size) {
            return Err(TensorforceError::value(
                "gather",
                "index",
                index,
                format!("< batch size {}", batch_size),
            ));
        }
        Ok(match self {
            Self::Bool(x) => Self::Bool(x.select(Axis(0), indices)),
            Self::Int(x) => Self::Int(x.select(Axis(0), indices)),
            Self::Float(x) => Self::Float(x.select(Axis(0), indices)),
        })
    }

    pub const fn as_bool(&self) -> Option<&ArrayD<bool>> {
        match self {
            Self::Bool(x) => Some(x),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            Self::Int(x) => Some(x),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<&ArrayD<f32>> {
        match self {
            Self::Float(x) => Some(x),
            _ => None,
        }
    }

    /// Values cast to float (`true` is 1).
    pub fn to_float(&self) -> ArrayD<f32> {
        match self {
            Self::Bool(x) => x.mapv(|b| if b { 1.0 } else { 0.0 }),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(x) => x.mapv(|i| i as f32),
            Self::Float(x) => x.clone(),
        }
    }

    /// Check that the tensor has the given type and per-instance shape (after a batch axis).
    ///
    /// # Errors
    /// On type or shape mismatch.
    pub fn check_spec(
        &self,
        name: &str,
        dtype: TensorType,
        shape: &[usize],
    ) -> Result<(), TensorforceError> {
        if self.dtype() != dtype {
            return Err(TensorforceError::dtype(name, "dtype", self.dtype()));
        }
        if self.shape().get(1..) != Some(shape) {
            return Err(TensorforceError::mismatch(
                name,
                "shape",
                format!("[batch, {:?}]", shape),
                format!("{:?}", self.shape()),
            ));
        }
        Ok(())
    }
}

impl From<ArrayD<bool>> for Tensor {
    fn from(x: ArrayD<bool>) -> Self {
        Self::Bool(x)
    }
}

impl From<ArrayD<i64>> for Tensor {
    fn from(x: ArrayD<i64>) -> Self {
        Self::Int(x)
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(x: ArrayD<f32>) -> Self {
        Self::Float(x)
    }
}

/// Optimizer argument: a tensor or a nested dictionary of arguments (such as `states`).
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Tensor(Tensor),
    Dict(TensorDict<Argument>),
}

/// Named optimizer arguments.
pub type Arguments = TensorDict<Argument>;

impl Argument {
    pub const fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(x) => Some(x),
            Self::Dict(_) => None,
        }
    }

    pub const fn as_dict(&self) -> Option<&TensorDict<Self>> {
        match self {
            Self::Tensor(_) => None,
            Self::Dict(x) => Some(x),
        }
    }

    /// Batch size of the (first) contained tensor.
    pub fn batch_size(&self) -> Option<usize> {
        match self {
            Self::Tensor(x) => x.batch_size(),
            Self::Dict(x) => x.values().find_map(Self::batch_size),
        }
    }

    /// Gather every contained tensor along its batch axis.
    ///
    /// # Errors
    /// If any contained tensor cannot be gathered.
    pub fn gather(&self, indices: &[usize]) -> Result<Self, TensorforceError> {
        Ok(match self {
            Self::Tensor(x) => Self::Tensor(x.gather(indices)?),
            Self::Dict(x) => Self::Dict(x.try_fmap(|_, value| value.gather(indices))?),
        })
    }
}

impl From<Tensor> for Argument {
    fn from(x: Tensor) -> Self {
        Self::Tensor(x)
    }
}

impl From<TensorDict<Tensor>> for Argument {
    fn from(x: TensorDict<Tensor>) -> Self {
        Self::Dict(x.fmap(|tensor| Self::Tensor(tensor.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn gather_repeats_rows() {
        let x = Tensor::Float(arr2(&[[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn());
        let y = x.gather(&[2, 0, 2]).unwrap();
        assert_eq!(
            y,
            Tensor::Float(arr2(&[[5.0_f32, 6.0], [1.0, 2.0], [5.0, 6.0]]).into_dyn())
        );
    }

    #[test]
    fn gather_out_of_bounds_fails() {
        let x = Tensor::Int(arr1(&[1_i64, 2]).into_dyn());
        assert!(x.gather(&[2]).is_err());
    }

    #[test]
    fn nested_argument_gather() {
        let states: TensorDict<Tensor> = [
            ("a", Tensor::Int(arr1(&[0_i64, 1, 2]).into_dyn())),
            ("b", Tensor::Bool(arr1(&[true, false, true]).into_dyn())),
        ]
        .into_iter()
        .collect();
        let argument = Argument::from(states);
        assert_eq!(argument.batch_size(), Some(3));
        let gathered = argument.gather(&[1, 1]).unwrap();
        let dict = gathered.as_dict().unwrap();
        assert_eq!(
            dict.get("a").and_then(Argument::as_tensor),
            Some(&Tensor::Int(arr1(&[1_i64, 1]).into_dyn()))
        );
    }

    #[test]
    fn check_spec_shape() {
        let x = Tensor::Float(ArrayD::zeros(ndarray::IxDyn(&[4, 2])));
        assert!(x.check_spec("x", TensorType::Float, &[2]).is_ok());
        assert!(x.check_spec("x", TensorType::Float, &[3]).is_err());
        assert!(x.check_spec("x", TensorType::Int, &[2]).is_err());
    }
}
