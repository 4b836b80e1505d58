//! Reinforcement learning agent core.
//!
//! Policies built from automatically configured networks and per-action parametrized
//! distributions, optimized by zeroth-order optimizers and update modifiers.
#![warn(clippy::cast_lossless)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::for_kv_map)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)]
pub mod distributions;
mod error;
pub mod logging;
pub mod networks;
pub mod optimizers;
pub mod parameters;
pub mod policies;
pub mod specs;
pub mod tensors;
pub mod utils;

pub use error::TensorforceError;
pub use logging::StatsLogger;
pub use optimizers::{Objective, Optimizer, OptimizerConfig};
pub use parameters::{Parameter, ParameterConfig};
pub use policies::{ParametrizedDistributions, ParametrizedDistributionsConfig};
pub use specs::{TensorSpec, TensorType};
pub use tensors::{Argument, Tensor, TensorDict, VarStore, Variable};

/// Pseudo-random number generator type used by this crate.
pub type Prng = rand_chacha::ChaCha8Rng;
