//! Signal filter — gates readings on market conditions before a pending
//! order is created.
//!
//! Filters must not reference portfolio state.

use serde::{Deserialize, Serialize};

use crate::config::{SignalConfig, TradingMode};
use crate::domain::{Bar, Side};

use super::SignalReading;

/// Outcome of a filter evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterVerdict {
    Passed,
    FilteredByTradingMode,
    FilteredByScore,
    FilteredByRegime,
    FilteredByVolume,
}

impl FilterVerdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Trait for signal filters.
pub trait SignalFilter: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, reading: &SignalReading, bar: &Bar) -> FilterVerdict;
}

/// Pass-through filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl SignalFilter for NoFilter {
    fn name(&self) -> &str {
        "no_filter"
    }

    fn evaluate(&self, _reading: &SignalReading, _bar: &Bar) -> FilterVerdict {
        FilterVerdict::Passed
    }
}

/// The configured entry gate: trading mode, minimum score, choppiness, and
/// volume, checked in that order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFilter {
    config: SignalConfig,
}

impl EntryFilter {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    fn is_choppy(&self, bar: &Bar) -> bool {
        if bar.choppy {
            return true;
        }
        match (self.config.adx_threshold, bar.adx) {
            (Some(threshold), Some(adx)) => adx < threshold,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

impl SignalFilter for EntryFilter {
    fn name(&self) -> &str {
        "entry_filter"
    }

    fn evaluate(&self, reading: &SignalReading, bar: &Bar) -> FilterVerdict {
        let mode_allows = match (self.config.trading_mode, reading.side) {
            (TradingMode::LongShort, _) => true,
            (TradingMode::LongOnly, side) => side == Side::Long,
            (TradingMode::ShortOnly, side) => side == Side::Short,
        };
        if !mode_allows {
            return FilterVerdict::FilteredByTradingMode;
        }

        if reading.score.abs() <= self.config.min_score {
            return FilterVerdict::FilteredByScore;
        }

        if !self.config.allow_choppy && self.is_choppy(bar) {
            return FilterVerdict::FilteredByRegime;
        }

        if let Some(min_ratio) = self.config.min_volume_ratio {
            // A missing ratio is treated as average volume.
            if bar.volume_ratio.unwrap_or(1.0) < min_ratio {
                return FilterVerdict::FilteredByVolume;
            }
        }

        FilterVerdict::Passed
    }
}
