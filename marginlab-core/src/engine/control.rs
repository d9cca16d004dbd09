//! Cooperative early stop, consulted once per timestamp after the ledger
//! update. An external optimizer uses it to prune hopeless trials.

use chrono::{DateTime, Utc};

/// Snapshot handed to the early-stop hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarProgress {
    /// Position in the merged timeline.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub marked_equity: f64,
    pub drawdown_pct: f64,
    pub trades_count: usize,
}

pub trait EarlyStop {
    /// Return `true` to end the run after the current timestamp.
    fn should_stop(&mut self, progress: &BarProgress) -> bool;
}

/// Runs to data exhaustion or liquidation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl EarlyStop for NeverStop {
    fn should_stop(&mut self, _progress: &BarProgress) -> bool {
        false
    }
}

impl<F> EarlyStop for F
where
    F: FnMut(&BarProgress) -> bool,
{
    fn should_stop(&mut self, progress: &BarProgress) -> bool {
        self(progress)
    }
}
