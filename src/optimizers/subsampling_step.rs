//! Subsampling update modifier
use super::{Deltas, Optimizer, OptimizerConfig, StepInputs};
use crate::logging::StatsLogger;
use crate::parameters::{Parameter, ParameterBounds, ParameterConfig};
use crate::tensors::{Argument, Arguments, Tensor};
use crate::{Prng, TensorforceError};
use log::debug;
use ndarray::{Array2, Axis, Ix2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for [`SubsamplingStep`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsamplingStepConfig {
    /// Wrapped optimizer.
    pub optimizer: Box<OptimizerConfig>,
    /// Fraction of the batch to sample (0 <= float <= 1).
    pub fraction: ParameterConfig,
}

impl SubsamplingStepConfig {
    /// # Errors
    /// If `fraction` is out of range or the wrapped optimizer fails to build.
    pub fn build(&self, name: &str) -> Result<SubsamplingStep, TensorforceError> {
        Ok(SubsamplingStep {
            optimizer: self.optimizer.build(&format!("{}/optimizer", name))?,
            fraction: self.fraction.build(
                &format!("{}/fraction", name),
                ParameterBounds::float().with_min(0.0).with_max(1.0),
            )?,
        })
    }
}

/// Update modifier that runs the wrapped optimizer on a random subset of the batch.
///
/// Batch elements are sampled uniformly with replacement.
/// The batch size is taken from the `reward` argument.
///
/// # Horizons
/// If the arguments contain both `states` and `horizons` then `states` is a buffer of
/// history rows and `horizons` holds an `(offset, length)` window per batch element.
/// The windows of the sampled elements are copied into a new contiguous buffer.
/// Other arguments whose name starts with `states` are treated as history buffers too.
#[derive(Debug)]
pub struct SubsamplingStep {
    optimizer: Box<dyn Optimizer>,
    fraction: Box<dyn Parameter>,
}

/// Whether an argument is a history buffer indexed by the `horizons` windows.
fn is_history(name: &str) -> bool {
    name.starts_with("states")
}

/// Size of the batch dimension of the arguments.
fn batch_size(arguments: &Arguments) -> Result<usize, TensorforceError> {
    let argument = arguments
        .get("reward")
        .or_else(|| {
            arguments
                .iter()
                .find(|(name, _)| !is_history(name) && *name != "horizons")
                .map(|(_, argument)| argument)
        })
        .ok_or_else(|| TensorforceError::required("subsampling_step", "reward"))?;
    argument
        .batch_size()
        .ok_or_else(|| TensorforceError::value("subsampling_step", "reward", "scalar", "batched"))
}

/// Number of sampled elements, at least one.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn num_samples(fraction: f64, batch_size: usize) -> usize {
    ((fraction * batch_size as f64).round() as usize).max(1)
}

/// `[rows, 2]` horizons array.
fn horizons_array(argument: &Argument) -> Result<Array2<i64>, TensorforceError> {
    let tensor = argument
        .as_tensor()
        .ok_or_else(|| TensorforceError::dtype("subsampling_step", "horizons", "dict"))?;
    let horizons = tensor
        .as_int()
        .ok_or_else(|| TensorforceError::dtype("subsampling_step", "horizons", tensor.dtype()))?;
    let horizons = horizons.clone().into_dimensionality::<Ix2>()?;
    if horizons.ncols() != 2 {
        return Err(TensorforceError::value(
            "subsampling_step",
            "horizons",
            format!("{:?}", horizons.shape()),
            "shape [batch_size, 2]",
        ));
    }
    Ok(horizons)
}

/// Indices of the history rows in each window, concatenated.
fn expand_windows(horizons: &Array2<i64>) -> Result<Vec<usize>, TensorforceError> {
    let mut indices = Vec::new();
    for window in horizons.rows() {
        let (offset, length) = (window[0], window[1]);
        if offset < 0 || length < 0 {
            return Err(TensorforceError::value(
                "subsampling_step",
                "horizons",
                format!("({}, {})", offset, length),
                "non-negative offset and length",
            ));
        }
        indices.extend((offset..offset + length).filter_map(|i| usize::try_from(i).ok()));
    }
    Ok(indices)
}

/// Contiguous windows `(exclusive cumsum of lengths, lengths)`.
fn contiguous_windows(horizons: &Array2<i64>) -> Array2<i64> {
    let mut windows = horizons.clone();
    let mut offset = 0;
    for mut window in windows.rows_mut() {
        window[0] = offset;
        offset += window[1];
    }
    windows
}

/// Gather the sampled batch elements of every argument.
///
/// # Errors
/// If an argument does not have the batch dimension or the horizons are invalid.
pub fn subsample(arguments: &Arguments, indices: &[usize]) -> Result<Arguments, TensorforceError> {
    let windows = match (arguments.get("states"), arguments.get("horizons")) {
        (Some(_), Some(horizons)) => {
            let horizons = horizons_array(horizons)?;
            let is_one_horizons = horizons.column(1).iter().all(|&length| length == 1);
            let gathered = horizons.select(Axis(0), indices);
            let states_indices = if is_one_horizons {
                indices.to_vec()
            } else {
                expand_windows(&gathered)?
            };
            Some((states_indices, contiguous_windows(&gathered)))
        }
        _ => None,
    };

    let mut subsampled = Arguments::new();
    for (name, argument) in arguments.iter() {
        let value = match (&windows, name) {
            (Some((states_indices, _)), name) if is_history(name) => {
                argument.gather(states_indices)?
            }
            (Some((_, horizons)), "horizons") => {
                Argument::Tensor(Tensor::Int(horizons.clone().into_dyn()))
            }
            _ => argument.gather(indices)?,
        };
        subsampled.insert(name, value);
    }
    Ok(subsampled)
}

impl Optimizer for SubsamplingStep {
    #[allow(clippy::cast_precision_loss)]
    fn step(
        &mut self,
        inputs: StepInputs,
        timestep: u64,
        rng: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> Result<Deltas, TensorforceError> {
        let batch_size = batch_size(inputs.arguments)?;
        if batch_size == 0 {
            return Err(TensorforceError::value(
                "subsampling_step",
                "batch_size",
                0,
                "> 0",
            ));
        }
        let fraction = self.fraction.value(timestep, rng);
        let num_samples = num_samples(fraction, batch_size);
        let indices: Vec<usize> = (0..num_samples)
            .map(|_| rng.gen_range(0..batch_size))
            .collect();
        debug!("subsampling {} of {} batch elements", num_samples, batch_size);
        logger.log_scalar("subsampling_step/num_samples", num_samples as f64);

        let arguments = subsample(inputs.arguments, &indices)?;
        self.optimizer
            .step(inputs.with_arguments(&arguments), timestep, rng, logger)
    }
}
