//! Summarizing logger
use super::{Id, LogError, Loggable, StatsLogger};
use crate::utils::stats::OnlineMeanVariance;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Summary of the values logged under one id since the last flush.
#[derive(Debug, Clone, PartialEq)]
pub enum Summary {
    Scalar(OnlineMeanVariance<f64>),
    /// Running total and its increase since the last flush.
    Counter { total: u64, increment: u64 },
}

impl Summary {
    fn empty(value: &Loggable) -> Self {
        match value {
            Loggable::Scalar(_) => Self::Scalar(OnlineMeanVariance::new()),
            Loggable::CounterIncrement(_) => Self::Counter {
                total: 0,
                increment: 0,
            },
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Counter { .. } => "counter",
        }
    }

    fn push(&mut self, id: &Id, value: Loggable) -> Result<(), LogError> {
        match (self, value) {
            (Self::Scalar(stats), Loggable::Scalar(x)) => stats.push(x),
            (Self::Counter { total, increment }, Loggable::CounterIncrement(i)) => {
                *total += i;
                *increment += i;
            }
            (summary, value) => {
                return Err(LogError::IncompatibleValue {
                    id: id.to_string(),
                    previous: summary.kind(),
                    now: value.kind(),
                })
            }
        }
        Ok(())
    }

    /// Whether nothing was logged since the last reset.
    const fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(stats) => stats.count() == 0,
            Self::Counter { increment, .. } => *increment == 0,
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Scalar(stats) => *stats = OnlineMeanVariance::new(),
            Self::Counter { increment, .. } => *increment = 0,
        }
    }
}

/// Destination of flushed summaries.
pub trait SummaryWriter {
    /// Write the non-empty summaries of a period of length `elapsed`, in id order.
    fn write(&mut self, summaries: &[(&Id, &Summary)], elapsed: Duration);
}

/// Collect summaries in memory.
impl SummaryWriter for Vec<(Id, Summary)> {
    fn write(&mut self, summaries: &[(&Id, &Summary)], _elapsed: Duration) {
        self.extend(
            summaries
                .iter()
                .map(|&(id, summary)| (id.clone(), summary.clone())),
        );
    }
}

/// Logger that summarizes the values logged between flushes.
///
/// Flushes on [`StatsLogger::flush`], when dropped, and (see [`SummaryLogger::flush_every`])
/// whenever a counter reaches a multiple of an interval.
#[derive(Debug)]
pub struct SummaryLogger<W: SummaryWriter> {
    writer: W,
    summaries: BTreeMap<Id, Summary>,
    flush_counter: Option<(Id, u64)>,
    period_start: Instant,
}

impl<W: SummaryWriter> SummaryLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            summaries: BTreeMap::new(),
            flush_counter: None,
            period_start: Instant::now(),
        }
    }

    /// Also flush after the counter `counter` reaches a multiple of `interval`.
    ///
    /// Log the counter after the other values of the same step so that they are included.
    #[must_use]
    pub fn flush_every(mut self, counter: &str, interval: u64) -> Self {
        self.flush_counter = Some((counter.into(), interval));
        self
    }

    pub const fn writer(&self) -> &W {
        &self.writer
    }

    fn flush_due(&self, id: &Id) -> bool {
        match (&self.flush_counter, self.summaries.get(id)) {
            (Some((counter, interval)), Some(Summary::Counter { total, .. })) => {
                counter == id && *interval > 0 && total % interval == 0
            }
            _ => false,
        }
    }
}

impl<W: SummaryWriter> StatsLogger for SummaryLogger<W> {
    fn log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.summaries
            .entry(id.clone())
            .or_insert_with(|| Summary::empty(&value))
            .push(&id, value)?;
        if self.flush_due(&id) {
            self.flush();
        }
        Ok(())
    }

    fn flush(&mut self) {
        let pending: Vec<_> = self
            .summaries
            .iter()
            .filter(|(_, summary)| !summary.is_empty())
            .collect();
        if !pending.is_empty() {
            self.writer.write(&pending, self.period_start.elapsed());
        }
        for summary in self.summaries.values_mut() {
            summary.reset();
        }
        self.period_start = Instant::now();
    }
}

impl<W: SummaryWriter> Drop for SummaryLogger<W> {
    fn drop(&mut self) {
        self.flush();
    }
}
