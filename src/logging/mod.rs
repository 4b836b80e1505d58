//! Logging statistics from optimizer steps.
//!
//! Diagnostic messages go through the [`log`] facade.
//! Numeric statistics go through a [`StatsLogger`], which aggregates them into summaries.
mod display;
mod summary;

pub use display::DisplayWriter;
pub use summary::{Summary, SummaryLogger, SummaryWriter};

use log::warn;
use std::fmt;
use thiserror::Error;

/// Identifier of a logged value, such as `subsampling_step/num_samples`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(String);

impl Id {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value that can be logged.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Loggable {
    /// Summarized by its mean and standard deviation.
    Scalar(f64),
    /// Increment of a running count.
    CounterIncrement(u64),
}

impl Loggable {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::CounterIncrement(_) => "counter",
        }
    }
}

impl From<f64> for Loggable {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("incompatible value for {id}: previously {previous}, now {now}")]
    IncompatibleValue {
        id: String,
        previous: &'static str,
        now: &'static str,
    },
}

/// Log statistics.
pub trait StatsLogger {
    /// Log a value.
    ///
    /// # Errors
    /// If a different kind of value was previously logged under the same id.
    fn log(&mut self, id: Id, value: Loggable) -> Result<(), LogError>;

    /// Write out any pending summaries.
    fn flush(&mut self);

    /// Log a scalar value, reporting (not returning) any error.
    fn log_scalar(&mut self, name: &str, value: f64) {
        if let Err(error) = self.log(name.into(), Loggable::Scalar(value)) {
            warn!("failed to log {}: {}", name, error);
        }
    }

    /// Log a counter increment, reporting (not returning) any error.
    fn log_counter_increment(&mut self, name: &str, increment: u64) {
        if let Err(error) = self.log(name.into(), Loggable::CounterIncrement(increment)) {
            warn!("failed to log {}: {}", name, error);
        }
    }
}

/// Logger that does nothing
impl StatsLogger for () {
    fn log(&mut self, _: Id, _: Loggable) -> Result<(), LogError> {
        Ok(())
    }
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_displays_name() {
        assert_eq!(Id::from("optimizer/delta_norm").to_string(), "optimizer/delta_norm");
    }

    #[test]
    fn null_logger_accepts_anything() {
        let mut logger = ();
        logger.log_scalar("x", 1.0);
        logger.log_counter_increment("x", 1);
        assert!(logger.log("y".into(), 2.0.into()).is_ok());
    }
}
