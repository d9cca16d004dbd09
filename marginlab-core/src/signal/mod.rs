//! Signal source seam — turns a closed bar into a directional decision.
//!
//! Signal sources are portfolio-agnostic: they see one bar and an optional
//! higher-timeframe bias, never positions or equity. The upstream indicator
//! engine does the scoring; a source here only reads its output.

pub mod filter;

pub use filter::{EntryFilter, FilterVerdict, NoFilter, SignalFilter};

use serde::{Deserialize, Serialize};

use crate::config::SignalConfig;
use crate::domain::{Bar, Side, TrendBias};

/// A directional decision at bar close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    pub side: Side,
    /// Raw score behind the decision, for filters and diagnostics.
    pub score: f64,
    /// Volatility measure captured at this close, used for the stop at fill.
    pub reference_volatility: f64,
}

/// Trait for signal sources.
pub trait SignalSource: Send + Sync {
    /// Human-readable name (e.g., "score").
    fn name(&self) -> &str;

    /// Evaluate the closed `bar`. `None` means no trade.
    fn evaluate(&self, bar: &Bar, htf_bias: Option<TrendBias>) -> Option<SignalReading>;
}

/// Reads the upstream score: `score > min_score` is long, `score < -min_score`
/// is short. A higher-timeframe bias vetoes trades against it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSignal {
    min_score: f64,
}

impl ScoreSignal {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(config.min_score)
    }
}

impl Default for ScoreSignal {
    fn default() -> Self {
        Self::from_config(&SignalConfig::default())
    }
}

impl SignalSource for ScoreSignal {
    fn name(&self) -> &str {
        "score"
    }

    fn evaluate(&self, bar: &Bar, htf_bias: Option<TrendBias>) -> Option<SignalReading> {
        let score = bar.score.filter(|s| s.is_finite())?;
        let side = if score > self.min_score {
            Side::Long
        } else if score < -self.min_score {
            Side::Short
        } else {
            return None;
        };

        match (side, htf_bias) {
            (Side::Long, Some(TrendBias::Bearish)) | (Side::Short, Some(TrendBias::Bullish)) => {
                return None
            }
            _ => {}
        }

        Some(SignalReading {
            side,
            score,
            reference_volatility: bar.reference_volatility(),
        })
    }
}

/// Never trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSignal;

impl SignalSource for NullSignal {
    fn name(&self) -> &str {
        "null"
    }

    fn evaluate(&self, _bar: &Bar, _htf_bias: Option<TrendBias>) -> Option<SignalReading> {
        None
    }
}
