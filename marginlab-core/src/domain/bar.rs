//! Bar — the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Higher-timeframe trend bias supplied by the upstream signal engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendBias {
    Bullish,
    Bearish,
}

/// OHLC bar for a single strategy key, enriched with signal-engine fields.
///
/// Bars are produced by the upstream data/indicator pipeline and are never
/// mutated by the engine. `prev_high`/`prev_low` carry the previous bar's
/// extremes for structure protection; [`link_previous_extremes`] fills them
/// for a series that does not already carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,

    // ── Previous bar structure ──
    #[serde(default)]
    pub prev_high: Option<f64>,
    #[serde(default)]
    pub prev_low: Option<f64>,

    // ── Signal-engine fields ──
    /// Reference volatility (ATR) at bar close.
    #[serde(default)]
    pub atr: Option<f64>,
    /// Directional score: positive is bullish, negative is bearish.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub adx: Option<f64>,
    /// Regime flag: sideways/choppy market.
    #[serde(default)]
    pub choppy: bool,
    /// Volume relative to its rolling average.
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    #[serde(default)]
    pub htf_bias: Option<TrendBias>,
}

/// Caller contract violations on a single bar.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("high {high} is below low {low}")]
    InvertedRange { high: f64, low: f64 },
}

impl Bar {
    /// Bar with OHLC only; every optional field empty.
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
            prev_high: None,
            prev_low: None,
            atr: None,
            score: None,
            adx: None,
            choppy: false,
            volume_ratio: None,
            htf_bias: None,
        }
    }

    pub fn with_atr(mut self, atr: f64) -> Self {
        self.atr = Some(atr);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_previous(mut self, prev_high: f64, prev_low: f64) -> Self {
        self.prev_high = Some(prev_high);
        self.prev_low = Some(prev_low);
        self
    }

    /// Check the required OHLC fields. Missing values arrive as NaN or
    /// infinities from upstream frames.
    pub fn validate(&self) -> Result<(), BarError> {
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() {
                return Err(BarError::MissingField(name));
            }
        }
        if self.high < self.low {
            return Err(BarError::InvertedRange {
                high: self.high,
                low: self.low,
            });
        }
        Ok(())
    }

    /// Reference volatility at close, falling back to 1% of close when the
    /// upstream engine did not provide a usable ATR.
    pub fn reference_volatility(&self) -> f64 {
        match self.atr {
            Some(atr) if atr.is_finite() => atr,
            _ => self.close * 0.01,
        }
    }
}

/// Fill `prev_high`/`prev_low` from the preceding bar wherever they are empty.
pub fn link_previous_extremes(bars: &mut [Bar]) {
    for i in 1..bars.len() {
        let (high, low) = (bars[i - 1].high, bars[i - 1].low);
        let bar = &mut bars[i];
        if bar.prev_high.is_none() {
            bar.prev_high = Some(high);
        }
        if bar.prev_low.is_none() {
            bar.prev_low = Some(low);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            100.0,
            105.0,
            98.0,
            103.0,
        )
    }

    #[test]
    fn valid_bar_passes() {
        assert!(sample_bar().validate().is_ok());
    }

    #[test]
    fn nan_field_is_missing() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert_eq!(bar.validate(), Err(BarError::MissingField("close")));
    }

    #[test]
    fn inverted_range_rejected() {
        let mut bar = sample_bar();
        bar.high = 97.0;
        assert!(matches!(
            bar.validate(),
            Err(BarError::InvertedRange { .. })
        ));
    }

    #[test]
    fn reference_volatility_falls_back_to_one_percent() {
        let bar = sample_bar();
        assert!((bar.reference_volatility() - 1.03).abs() < 1e-12);
        assert_eq!(bar.with_atr(2.5).reference_volatility(), 2.5);
    }

    #[test]
    fn link_previous_fills_only_empty_slots() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut bars = vec![
            Bar::new(t0, 10.0, 12.0, 9.0, 11.0),
            Bar::new(t0 + chrono::Duration::hours(1), 11.0, 13.0, 10.0, 12.0),
            Bar::new(t0 + chrono::Duration::hours(2), 12.0, 14.0, 11.0, 13.0)
                .with_previous(99.0, 1.0),
        ];
        link_previous_extremes(&mut bars);
        assert_eq!(bars[0].prev_high, None);
        assert_eq!(bars[1].prev_high, Some(12.0));
        assert_eq!(bars[1].prev_low, Some(9.0));
        assert_eq!(bars[2].prev_high, Some(99.0));
    }

    #[test]
    fn bar_deserializes_with_only_required_fields() {
        let json = r#"{"timestamp":"2024-01-02T00:00:00Z","open":1.0,"high":2.0,"low":0.5,"close":1.5}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.volume, None);
        assert!(!bar.choppy);
    }
}
