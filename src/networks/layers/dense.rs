//! Dense and linear layers
use super::glorot_stddev;
use crate::tensors::{VarStore, Variable};
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, ArrayView2, Axis, Ix2, IxDyn};

/// Affine transformation of the last axis, optionally followed by `tanh`.
#[derive(Debug)]
pub struct Dense {
    weights: Variable,
    bias: Variable,
    activation: bool,
    /// Output size 0: compute a single output and drop the last axis.
    squeeze: bool,
}

impl Dense {
    /// Create a layer with variables `<path>/weights` and `<path>/bias`.
    ///
    /// # Errors
    /// If a variable name is taken.
    pub fn new(
        path: &str,
        input_size: usize,
        size: usize,
        activation: bool,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        let output_size = size.max(1);
        let weights = vs.normal(
            format!("{}/weights", path),
            &[input_size, output_size],
            glorot_stddev(input_size, output_size),
            rng,
        )?;
        let bias = vs.zeros(format!("{}/bias", path), &[output_size])?;
        Ok(Self {
            weights,
            bias,
            activation,
            squeeze: size == 0,
        })
    }

    /// Apply to an input of shape `[..., input_size]`.
    ///
    /// # Errors
    /// If the last axis of the input does not match.
    pub fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, TensorforceError> {
        let weights = self.weights.read();
        let bias = self.bias.read();
        let mut output = matmul_last(input, weights.view().into_dimensionality::<Ix2>()?)?;
        output += &*bias;
        if self.activation {
            output.mapv_inplace(f32::tanh);
        }
        if self.squeeze {
            let last = output.ndim() - 1;
            output = output.index_axis_move(Axis(last), 0);
        }
        Ok(output)
    }

    pub fn variables(&self) -> Vec<Variable> {
        vec![self.weights.clone(), self.bias.clone()]
    }
}

/// Multiply the last axis of `input` by a `[input_size, output_size]` matrix.
///
/// # Errors
/// If the last axis of the input does not have size `input_size`.
pub fn matmul_last(
    input: &ArrayD<f32>,
    weights: ArrayView2<f32>,
) -> Result<ArrayD<f32>, TensorforceError> {
    let (input_size, output_size) = weights.dim();
    let shape = input.shape();
    let (last, outer) = shape
        .split_last()
        .ok_or_else(|| TensorforceError::value("matmul", "input rank", 0, ">= 1"))?;
    if *last != input_size {
        return Err(TensorforceError::mismatch(
            "matmul",
            "input size",
            input_size,
            last,
        ));
    }
    let rows: usize = outer.iter().product();
    let flat = input
        .as_standard_layout()
        .into_shape((rows, input_size))?;
    let output = flat.dot(&weights);

    let mut output_shape = outer.to_vec();
    output_shape.push(output_size);
    Ok(output.into_shape(IxDyn(&output_shape))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array};
    use rand::SeedableRng;

    #[test]
    fn matmul_last_batched() {
        let input = Array::from_shape_vec((2, 1, 2), vec![1.0_f32, 2.0, 3.0, 4.0])
            .unwrap()
            .into_dyn();
        let weights = arr2(&[[1.0_f32, 0.0, 1.0], [0.0, 1.0, 1.0]]);
        let output = matmul_last(&input, weights.view()).unwrap();
        assert_eq!(output.shape(), &[2, 1, 3]);
        assert_eq!(
            output.into_raw_vec(),
            vec![1.0, 2.0, 3.0, 3.0, 4.0, 7.0]
        );
    }

    #[test]
    fn matmul_last_size_mismatch() {
        let input = arr1(&[1.0_f32, 2.0]).into_dyn();
        let weights = arr2(&[[1.0_f32], [1.0], [1.0]]);
        assert!(matmul_last(&input, weights.view()).is_err());
    }

    #[test]
    fn dense_tanh_bounded() {
        let mut vs = VarStore::new();
        let mut rng = Prng::seed_from_u64(0);
        let layer = Dense::new("d", 3, 4, true, &mut vs, &mut rng).unwrap();
        assert_eq!(vs.variables().len(), 2);
        let input = arr2(&[[100.0_f32, -50.0, 3.0], [0.0, 0.0, 0.0]]).into_dyn();
        let output = layer.forward(&input).unwrap();
        assert_eq!(output.shape(), &[2, 4]);
        assert!(output.iter().all(|x| x.abs() <= 1.0));
        // Zero input and zero bias
        assert!(output.index_axis(Axis(0), 1).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn linear_squeeze() {
        let mut vs = VarStore::new();
        let mut rng = Prng::seed_from_u64(0);
        let layer = Dense::new("value", 2, 0, false, &mut vs, &mut rng).unwrap();
        vs.get("value/weights")
            .unwrap()
            .assign(&arr2(&[[2.0_f32], [-1.0]]).into_dyn())
            .unwrap();
        vs.get("value/bias")
            .unwrap()
            .assign(&arr1(&[0.5_f32]).into_dyn())
            .unwrap();
        let output = layer
            .forward(&arr2(&[[1.0_f32, 1.0], [3.0, 0.0]]).into_dyn())
            .unwrap();
        assert_eq!(output, arr1(&[1.5_f32, 6.5]).into_dyn());
    }
}
