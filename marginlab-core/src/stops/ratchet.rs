//! Stop ratchet: stops may tighten, never loosen.
//!
//! - Long positions: the stop can only rise.
//! - Short positions: the stop can only fall.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Monotonic stop-loss level for one open position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopRatchet {
    level: f64,
    side: Side,
}

impl StopRatchet {
    pub fn with_initial_level(side: Side, initial_level: f64) -> Self {
        Self {
            level: initial_level,
            side,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Whether `proposed` is strictly more protective than the current level.
    pub fn is_tighter(&self, proposed: f64) -> bool {
        match self.side {
            Side::Long => proposed > self.level,
            Side::Short => proposed < self.level,
        }
    }

    /// Move to `proposed` only if it tightens the stop. Returns whether the
    /// level changed.
    pub fn propose(&mut self, proposed: f64) -> bool {
        if proposed.is_finite() && self.is_tighter(proposed) {
            self.level = proposed;
            true
        } else {
            false
        }
    }
}
