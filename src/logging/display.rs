//! Summaries on standard output
use super::summary::{Summary, SummaryWriter};
use super::Id;
use std::fmt;
use std::time::Duration;
use yansi::Paint;

/// Writes summaries to standard output.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DisplayWriter;

impl SummaryWriter for DisplayWriter {
    fn write(&mut self, summaries: &[(&Id, &Summary)], elapsed: Duration) {
        println!();
        println!("{}", Paint::fixed(8, format!("({:.2?})", elapsed)));
        for (id, summary) in summaries {
            println!("{:<32} {}", Paint::fixed(35, id), summary);
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Scalar(stats) => match (stats.mean(), stats.stddev()) {
                (Some(mean), Some(stddev)) if stats.count() > 1 => write!(
                    f,
                    "{:.4} {}",
                    mean,
                    Paint::fixed(8, format!("(σ {:.4})", stddev))
                ),
                (Some(mean), _) => write!(f, "{:.4}", mean),
                (None, _) => Ok(()),
            },
            Self::Counter { total, increment } => {
                write!(f, "{}  {}", total, Paint::fixed(253, format!("(+{})", increment)))
            }
        }
    }
}
