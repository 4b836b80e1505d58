//! Long Short-Term Memory
use super::glorot_stddev;
use crate::specs::TensorSpec;
use crate::tensors::{VarStore, Variable};
use crate::utils::numeric::sigmoid;
use crate::{Prng, TensorforceError};
use ndarray::{s, stack, Array1, ArrayD, ArrayView1, ArrayViewD, Axis, Ix1, Ix2, IxDyn};

/// LSTM cell whose hidden and cell state are carried as a network internal.
#[derive(Debug)]
pub struct Lstm {
    /// Shape `[input_size, 4 * size]`, gates ordered input, forget, cell, output.
    input_weights: Variable,
    /// Shape `[size, 4 * size]`.
    recurrent_weights: Variable,
    /// Shape `[4 * size]`.
    bias: Variable,
    internal_name: String,
    size: usize,
    horizon: usize,
}

/// Hidden and cell state.
pub type LstmState = (Array1<f32>, Array1<f32>);

impl Lstm {
    /// # Errors
    /// If a variable name is taken.
    pub fn new(
        path: &str,
        name: &str,
        input_size: usize,
        size: usize,
        horizon: usize,
        vs: &mut VarStore,
        rng: &mut Prng,
    ) -> Result<Self, TensorforceError> {
        let input_weights = vs.normal(
            format!("{}/input_weights", path),
            &[input_size, 4 * size],
            glorot_stddev(input_size, 4 * size),
            rng,
        )?;
        let recurrent_weights = vs.normal(
            format!("{}/recurrent_weights", path),
            &[size, 4 * size],
            glorot_stddev(size, 4 * size),
            rng,
        )?;
        let bias = vs.zeros(format!("{}/bias", path), &[4 * size])?;
        Ok(Self {
            input_weights,
            recurrent_weights,
            bias,
            internal_name: name.to_owned(),
            size,
            horizon,
        })
    }

    /// Name of the internal holding the `[2, size]` (hidden, cell) state.
    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    pub fn internal_spec(&self) -> TensorSpec {
        TensorSpec::float([2, self.size])
    }

    /// Zero initial state, as a `[2, size]` array.
    pub fn internal_init(&self) -> ArrayD<f32> {
        ArrayD::zeros(IxDyn(&[2, self.size]))
    }

    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    pub const fn size(&self) -> usize {
        self.size
    }

    /// Advance the state over a sequence of inputs (rows), returning the final state.
    ///
    /// # Errors
    /// If the input or state shapes do not match the cell.
    pub fn unroll<'a>(
        &self,
        inputs: impl IntoIterator<Item = ArrayView1<'a, f32>>,
        mut state: LstmState,
    ) -> Result<LstmState, TensorforceError> {
        let input_weights = self.input_weights.read();
        let input_weights = input_weights.view().into_dimensionality::<Ix2>()?;
        let recurrent_weights = self.recurrent_weights.read();
        let recurrent_weights = recurrent_weights.view().into_dimensionality::<Ix2>()?;
        let bias = self.bias.read();
        let bias = bias.view().into_dimensionality::<Ix1>()?;

        let size = self.size;
        for input in inputs {
            if input.len() != input_weights.nrows() || state.0.len() != size {
                return Err(TensorforceError::mismatch(
                    "lstm",
                    "input size",
                    input_weights.nrows(),
                    input.len(),
                ));
            }
            let gates = input.dot(&input_weights) + state.0.dot(&recurrent_weights) + bias;
            let input_gate = gates.slice(s![..size]).mapv(sigmoid);
            let forget_gate = gates.slice(s![size..2 * size]).mapv(sigmoid);
            let cell_gate = gates.slice(s![2 * size..3 * size]).mapv(f32::tanh);
            let output_gate = gates.slice(s![3 * size..]).mapv(sigmoid);

            let cell = forget_gate * &state.1 + input_gate * cell_gate;
            let hidden = output_gate * cell.mapv(f32::tanh);
            state = (hidden, cell);
        }
        Ok(state)
    }

    pub fn variables(&self) -> Vec<Variable> {
        vec![
            self.input_weights.clone(),
            self.recurrent_weights.clone(),
            self.bias.clone(),
        ]
    }
}

/// Split a `[2, size]` internal into (hidden, cell) state.
///
/// # Errors
/// If the internal does not have shape `[2, size]`.
pub fn split_state(internal: ArrayViewD<f32>, size: usize) -> Result<LstmState, TensorforceError> {
    if internal.shape() != [2, size] {
        return Err(TensorforceError::mismatch(
            "lstm",
            "internal shape",
            format!("{:?}", [2, size]),
            format!("{:?}", internal.shape()),
        ));
    }
    let hidden = internal.index_axis(Axis(0), 0).into_dimensionality::<Ix1>()?;
    let cell = internal.index_axis(Axis(0), 1).into_dimensionality::<Ix1>()?;
    Ok((hidden.to_owned(), cell.to_owned()))
}

/// Join (hidden, cell) state into a `[2, size]` internal.
///
/// # Errors
/// If hidden and cell state differ in size.
pub fn join_state(state: &LstmState) -> Result<ArrayD<f32>, TensorforceError> {
    Ok(stack(Axis(0), &[state.0.view(), state.1.view()])?.into_dyn())
}
