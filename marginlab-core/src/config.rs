//! Typed, validated configuration for a simulation run.
//!
//! Percent-valued fields keep the percent unit used in strategy files
//! (`min_sl_pct = 0.5` means 0.5%); accessors return the fractional form the
//! engine computes with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling on risk per trade, in percent of equity, regardless of config.
pub const MAX_RISK_PER_TRADE_PCT: f64 = 2.0;

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be finite and > 0, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be finite and >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("leverage must be >= 1")]
    ZeroLeverage,
    #[error("min_bars must be >= 1")]
    ZeroMinBars,
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

/// Per-strategy risk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Take-profit distance as a multiple of stop distance.
    pub risk_reward_ratio: f64,
    /// Percent of equity risked per trade; clamped to [`MAX_RISK_PER_TRADE_PCT`].
    pub risk_per_trade_pct: f64,
    pub leverage: u32,
    pub atr_multiplier_sl: f64,
    /// Minimum stop distance as percent of entry price.
    pub min_sl_pct: f64,
    /// Multiple of stop distance beyond which the trailing stop arms.
    pub trailing_stop_activation_rr: f64,
    /// Retracement from peak that exits a trailing position, in percent.
    pub trailing_stop_callback_rate_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_reward_ratio: 2.0,
            risk_per_trade_pct: 1.0,
            leverage: 10,
            atr_multiplier_sl: 2.0,
            min_sl_pct: 0.5,
            trailing_stop_activation_rr: 1.5,
            trailing_stop_callback_rate_pct: 0.5,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("risk_reward_ratio", self.risk_reward_ratio)?;
        positive("risk_per_trade_pct", self.risk_per_trade_pct)?;
        if self.leverage == 0 {
            return Err(ConfigError::ZeroLeverage);
        }
        non_negative("atr_multiplier_sl", self.atr_multiplier_sl)?;
        non_negative("min_sl_pct", self.min_sl_pct)?;
        positive("trailing_stop_activation_rr", self.trailing_stop_activation_rr)?;
        non_negative(
            "trailing_stop_callback_rate_pct",
            self.trailing_stop_callback_rate_pct,
        )?;
        Ok(())
    }

    /// Risk per trade in percent after the hard cap.
    pub fn effective_risk_pct(&self) -> f64 {
        self.risk_per_trade_pct.min(MAX_RISK_PER_TRADE_PCT)
    }

    pub fn min_sl_fraction(&self) -> f64 {
        self.min_sl_pct / 100.0
    }

    pub fn callback_rate(&self) -> f64 {
        self.trailing_stop_callback_rate_pct / 100.0
    }
}

/// Exchange-side sizing constants shared by every key in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConstraints {
    /// Taker fee per leg, in percent of notional.
    pub fee_rate_pct: f64,
    pub min_notional: f64,
    /// Absolute notional ceiling per position.
    pub max_notional: f64,
    /// Notional may not exceed `equity * max_effective_leverage`.
    pub max_effective_leverage: f64,
}

impl Default for ExchangeConstraints {
    fn default() -> Self {
        Self {
            fee_rate_pct: 0.06,
            min_notional: 5.0,
            max_notional: 1_000_000.0,
            max_effective_leverage: 10.0,
        }
    }
}

impl ExchangeConstraints {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("fee_rate_pct", self.fee_rate_pct)?;
        non_negative("min_notional", self.min_notional)?;
        positive("max_notional", self.max_notional)?;
        positive("max_effective_leverage", self.max_effective_leverage)?;
        Ok(())
    }

    /// Entry plus exit fee on `notional`.
    pub fn round_trip_fee(&self, notional: f64) -> f64 {
        notional * self.fee_rate_pct / 100.0 * 2.0
    }
}

/// Which directions a strategy may trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    LongOnly,
    ShortOnly,
    #[default]
    LongShort,
}

/// Entry filter settings applied after the signal source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Absolute score must strictly exceed this to trade.
    pub min_score: f64,
    /// Trade even when the bar is flagged choppy.
    pub allow_choppy: bool,
    /// Skip bars whose volume ratio is below this, when set.
    pub min_volume_ratio: Option<f64>,
    /// Treat bars with ADX below this as choppy, in addition to the bar flag.
    pub adx_threshold: Option<f64>,
    pub trading_mode: TradingMode,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            allow_choppy: false,
            min_volume_ratio: None,
            adx_threshold: None,
            trading_mode: TradingMode::LongShort,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("min_score", self.min_score)?;
        if let Some(ratio) = self.min_volume_ratio {
            non_negative("min_volume_ratio", ratio)?;
        }
        if let Some(adx) = self.adx_threshold {
            non_negative("adx_threshold", adx)?;
        }
        Ok(())
    }
}

/// Run-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub start_capital: f64,
    /// Single-strategy runs with fewer bars return the degenerate result.
    pub min_bars: usize,
    pub exchange: ExchangeConstraints,
    /// Portfolio cap on simultaneously open positions.
    pub max_concurrent_positions: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_capital: 1000.0,
            min_bars: 50,
            exchange: ExchangeConstraints::default(),
            max_concurrent_positions: None,
        }
    }
}

impl EngineConfig {
    pub fn new(start_capital: f64) -> Self {
        Self {
            start_capital,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("start_capital", self.start_capital)?;
        if self.min_bars == 0 {
            return Err(ConfigError::ZeroMinBars);
        }
        self.exchange.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RiskConfig::default().validate().is_ok());
        assert!(ExchangeConstraints::default().validate().is_ok());
        assert!(SignalConfig::default().validate().is_ok());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn risk_is_hard_capped_at_two_percent() {
        let risk = RiskConfig {
            risk_per_trade_pct: 5.0,
            ..RiskConfig::default()
        };
        assert_eq!(risk.effective_risk_pct(), 2.0);
        let risk = RiskConfig {
            risk_per_trade_pct: 0.75,
            ..RiskConfig::default()
        };
        assert_eq!(risk.effective_risk_pct(), 0.75);
    }

    #[test]
    fn percent_fields_convert_to_fractions() {
        let risk = RiskConfig::default();
        assert!((risk.min_sl_fraction() - 0.005).abs() < 1e-15);
        assert!((risk.callback_rate() - 0.005).abs() < 1e-15);
    }

    #[test]
    fn zero_leverage_rejected() {
        let risk = RiskConfig {
            leverage: 0,
            ..RiskConfig::default()
        };
        assert_eq!(risk.validate(), Err(ConfigError::ZeroLeverage));
    }

    #[test]
    fn nan_ratio_rejected() {
        let risk = RiskConfig {
            risk_reward_ratio: f64::NAN,
            ..RiskConfig::default()
        };
        assert!(matches!(
            risk.validate(),
            Err(ConfigError::NotPositive { field: "risk_reward_ratio", .. })
        ));
    }

    #[test]
    fn round_trip_fee_charges_both_legs() {
        let exchange = ExchangeConstraints::default();
        assert!((exchange.round_trip_fee(1000.0) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn partial_risk_section_uses_defaults() {
        let risk: RiskConfig = serde_json::from_str(r#"{"leverage": 20}"#).unwrap();
        assert_eq!(risk.leverage, 20);
        assert_eq!(risk.risk_reward_ratio, 2.0);
    }
}
