//! Convolution layers
use super::dense::matmul_last;
use super::glorot_stddev;
use crate::tensors::{VarStore, Variable};
use crate::{Prng, TensorforceError};
use ndarray::{ArrayD, Axis, Ix2, Slice};

const KERNEL_SIZE: usize = 3;

/// Same-padded convolution over 1 or 2 spatial axes followed by `tanh`.
///
/// Input shape is `[batch, spatial..., input_size]`, output `[batch, spatial..., size]`.
#[derive(Debug)]
pub struct Conv {
    /// Shape `[3, (3,) input_size, size]`.
    weights: Variable,
    bias: Variable,
    spatial: usize,
}

impl Conv {
    /// Create a layer with variables `<path>/weights` and `<path>/bias`.
    ///
    /// # Errors
    /// If a variable name is taken.
    pub fn new(
        path: &str,
        spatial: usize,
        input_size: usize,
        size: usize,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        let mut shape = vec![KERNEL_SIZE; spatial];
        shape.push(input_size);
        shape.push(size);
        let receptive_field = KERNEL_SIZE.pow(spatial as u32);
        let weights = vs.normal(
            format!("{}/weights", path),
            &shape,
            glorot_stddev(receptive_field * input_size, receptive_field * size),
            rng,
        )?;
        let bias = vs.zeros(format!("{}/bias", path), &[size])?;
        Ok(Self {
            weights,
            bias,
            spatial,
        })
    }

    /// # Errors
    /// If the input shape does not match the layer.
    pub fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, TensorforceError> {
        if input.ndim() != self.spatial + 2 {
            return Err(TensorforceError::mismatch(
                "conv",
                "input rank",
                self.spatial + 2,
                input.ndim(),
            ));
        }
        let weights = self.weights.read();
        let mut output: Option<ArrayD<f32>> = None;
        for position in kernel_positions(self.spatial) {
            let mut shifted = input.clone();
            let mut kernel = weights.view();
            for (i, &k) in position.iter().enumerate() {
                shifted = shift(&shifted, i + 1, k as isize - 1);
                kernel = kernel.index_axis_move(Axis(0), k);
            }
            let term = matmul_last(&shifted, kernel.into_dimensionality::<Ix2>()?)?;
            output = Some(match output {
                Some(sum) => sum + term,
                None => term,
            });
        }
        let mut output =
            output.ok_or_else(|| TensorforceError::value("conv", "spatial", 0, ">= 1"))?;
        output += &*self.bias.read();
        output.mapv_inplace(f32::tanh);
        Ok(output)
    }

    pub fn variables(&self) -> Vec<Variable> {
        vec![self.weights.clone(), self.bias.clone()]
    }
}

/// All kernel index tuples for the given number of spatial axes.
fn kernel_positions(spatial: usize) -> Vec<Vec<usize>> {
    (0..spatial).fold(vec![Vec::new()], |positions, _| {
        positions
            .into_iter()
            .flat_map(|position| {
                (0..KERNEL_SIZE).map(move |k| {
                    let mut extended = position.clone();
                    extended.push(k);
                    extended
                })
            })
            .collect()
    })
}

/// `output[..., i, ...] = input[..., i + offset, ...]` along `axis`, zero outside the input.
fn shift(input: &ArrayD<f32>, axis: usize, offset: isize) -> ArrayD<f32> {
    let mut output = ArrayD::zeros(input.raw_dim());
    let len = input.len_of(Axis(axis)) as isize;
    let count = len - offset.abs();
    if count > 0 {
        let (source, target) = if offset >= 0 {
            (offset, 0)
        } else {
            (0, -offset)
        };
        output
            .slice_axis_mut(Axis(axis), Slice::from(target..target + count))
            .assign(&input.slice_axis(Axis(axis), Slice::from(source..source + count)));
    }
    output
}
