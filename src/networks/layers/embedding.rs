//! Embedding layer
use super::glorot_stddev;
use crate::specs::{TensorSpec, TensorType};
use crate::tensors::{Tensor, VarStore, Variable};
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, Axis, Ix2, IxDyn};

/// Lookup table embedding of bool or int values.
#[derive(Debug)]
pub struct Embedding {
    /// Shape `[num_values, size]`.
    table: Variable,
    num_values: usize,
}

impl Embedding {
    /// Create an embedding with the table variable `<path>/embeddings`.
    ///
    /// # Errors
    /// If the input is not bool or int, or the table name is taken.
    pub fn new(
        name: &str,
        path: &str,
        input: &TensorSpec,
        size: usize,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        let num_values = match input.dtype {
            TensorType::Bool => 2,
            TensorType::Int => input
                .num_values
                .ok_or_else(|| TensorforceError::required(name, "num_values"))?,
            TensorType::Float => return Err(TensorforceError::dtype(name, "input", input.dtype)),
        };
        let table = vs.normal(
            format!("{}/embeddings", path),
            &[num_values, size],
            glorot_stddev(num_values, size),
            rng,
        )?;
        Ok(Self { table, num_values })
    }

    pub const fn table(&self) -> &Variable {
        &self.table
    }

    /// Embed every element of the input, adding a trailing axis.
    ///
    /// # Errors
    /// If the input is a float tensor or contains a value outside `0..num_values`.
    pub fn forward(&self, name: &str, input: &Tensor) -> Result<ArrayD<f32>, TensorforceError> {
        let indices: Vec<usize> = match input {
            Tensor::Bool(x) => x.iter().map(|&b| usize::from(b)).collect(),
            Tensor::Int(x) => x
                .iter()
                .map(|&i| {
                    usize::try_from(i)
                        .ok()
                        .filter(|&i| i < self.num_values)
                        .ok_or_else(|| {
                            TensorforceError::value(
                                name,
                                "input",
                                i,
                                format!("0 <= value < {}", self.num_values),
                            )
                        })
                })
                .collect::<Result<_, _>>()?,
            Tensor::Float(_) => return Err(TensorforceError::dtype(name, "input", input.dtype())),
        };
        let table = self.table.read();
        let table = table.view().into_dimensionality::<Ix2>()?;
        let embeddings = table.select(Axis(0), &indices);

        let mut shape = input.shape().to_vec();
        shape.push(table.ncols());
        Ok(embeddings.into_shape(IxDyn(&shape))?)
    }
}
