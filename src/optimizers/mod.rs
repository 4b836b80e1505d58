//! Optimizers and update modifiers.
//!
//! An optimizer step updates a set of variables in place and returns the applied deltas.
//! Update modifiers wrap another optimizer and transform its arguments or its deltas.
mod clipping_step;
mod evolutionary;
mod multi_step;
mod subsampling_step;

pub use clipping_step::{ClippingMode, ClippingStep, ClippingStepConfig};
pub use evolutionary::{Evolutionary, EvolutionaryConfig};
pub use multi_step::{MultiStep, MultiStepConfig};
pub use subsampling_step::{SubsamplingStep, SubsamplingStepConfig};

use crate::logging::StatsLogger;
use crate::tensors::{Argument, Arguments, TensorDict, Variable};
use crate::{Prng, TensorforceError};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-variable deltas, by variable name.
pub type Deltas = TensorDict<ArrayD<f32>>;

/// Objective minimized by an optimizer, evaluated at the current variable values.
pub trait Objective {
    /// Loss of the arguments.
    ///
    /// # Errors
    /// If the arguments are invalid for the objective.
    fn loss(&self, arguments: &Arguments) -> Result<f32, TensorforceError>;

    /// Reference values recorded before a step, for use by [`Objective::comparative_loss`].
    ///
    /// # Errors
    /// If the arguments are invalid for the objective.
    fn reference(&self, _arguments: &Arguments) -> Result<Argument, TensorforceError> {
        Ok(Argument::Dict(TensorDict::new()))
    }

    /// Loss relative to reference values recorded before the step.
    ///
    /// # Errors
    /// If the arguments or the reference are invalid for the objective.
    fn comparative_loss(
        &self,
        arguments: &Arguments,
        _reference: &Argument,
    ) -> Result<f32, TensorforceError> {
        self.loss(arguments)
    }
}

/// Inputs to an optimization step.
#[derive(Clone, Copy)]
pub struct StepInputs<'a> {
    /// Batch of named arguments to the objective.
    pub arguments: &'a Arguments,
    /// Variables updated by the step.
    pub variables: &'a [Variable],
    pub objective: &'a dyn Objective,
}

impl<'a> StepInputs<'a> {
    /// The same inputs with other arguments.
    #[must_use]
    pub const fn with_arguments(self, arguments: &'a Arguments) -> Self {
        Self { arguments, ..self }
    }

    /// Zero delta for every variable.
    pub fn zero_deltas(&self) -> Deltas {
        self.variables
            .iter()
            .map(|v| (v.name().to_owned(), v.zeros_like()))
            .collect()
    }
}

/// An optimizer updating variables in place.
pub trait Optimizer: fmt::Debug {
    /// Perform an optimization step.
    ///
    /// # Args
    /// * `inputs` - Arguments, variables and the objective to minimize.
    /// * `timestep` - Current timestep, for evaluating hyperparameter schedules.
    /// * `rng` - Random number generator.
    /// * `logger` - Logger for step statistics.
    ///
    /// # Returns
    /// The delta applied to each variable, keyed by variable name.
    /// Deltas cover exactly `inputs.variables`.
    ///
    /// # Errors
    /// If the arguments are invalid. Variables are left unchanged on error.
    fn step(
        &mut self,
        inputs: StepInputs,
        timestep: u64,
        rng: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> Result<Deltas, TensorforceError>;
}

/// Optimizer configuration, selected by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Evolutionary(EvolutionaryConfig),
    SubsamplingStep(SubsamplingStepConfig),
    MultiStep(MultiStepConfig),
    ClippingStep(ClippingStepConfig),
}

impl OptimizerConfig {
    /// Build the optimizer.
    ///
    /// # Errors
    /// If a hyperparameter is invalid.
    pub fn build(&self, name: &str) -> Result<Box<dyn Optimizer>, TensorforceError> {
        Ok(match self {
            Self::Evolutionary(config) => Box::new(config.build(name)?),
            Self::SubsamplingStep(config) => Box::new(config.build(name)?),
            Self::MultiStep(config) => Box::new(config.build(name)?),
            Self::ClippingStep(config) => Box::new(config.build(name)?),
        })
    }
}

impl From<EvolutionaryConfig> for OptimizerConfig {
    fn from(config: EvolutionaryConfig) -> Self {
        Self::Evolutionary(config)
    }
}

/// Add `deltas[v.name()]` to each variable.
fn apply_deltas(variables: &[Variable], deltas: &Deltas) -> Result<(), TensorforceError> {
    for variable in variables {
        let delta = deltas.require("optimizer", variable.name())?;
        variable.assign_add(delta)?;
    }
    Ok(())
}
