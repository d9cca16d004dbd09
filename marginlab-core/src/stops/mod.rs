//! Stop engine — protective stop-loss, take-profit, and trailing stop.
//!
//! A position moves `Armed → Trailing → Closed`. Each bar is evaluated in a
//! fixed, pessimistic order:
//!
//! 1. Activation: the favorable extreme crosses the activation price.
//! 2. Ratchet: while trailing, the peak follows the favorable extreme and the
//!    stop follows `peak * (1 ∓ callback_rate)`, tightening only.
//! 3. Stop check against the adverse extreme (low for long, high for short).
//! 4. Take-profit check, only while not trailing.
//!
//! When both stop and target sit inside one bar's range the stop wins.

pub mod ratchet;

pub use ratchet::StopRatchet;

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::domain::{Bar, ExitReason, Position, Side};

/// Protective levels computed once at fill time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopPlan {
    pub stop_distance: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub activation_price: f64,
}

impl StopPlan {
    /// Compute levels for an entry at `entry_price`.
    ///
    /// `reference_volatility` comes from the signal bar, never the fill bar.
    /// `structure_extreme` is the signal bar's opposing extreme (its low for
    /// a long, its high for a short); when present the stop is widened to
    /// clear it, never tightened.
    pub fn compute(
        side: Side,
        entry_price: f64,
        reference_volatility: f64,
        structure_extreme: Option<f64>,
        risk: &RiskConfig,
    ) -> Self {
        let mut stop_distance = (reference_volatility * risk.atr_multiplier_sl)
            .max(entry_price * risk.min_sl_fraction());

        if let Some(extreme) = structure_extreme.filter(|v| v.is_finite()) {
            let structure_distance = match side {
                Side::Long => entry_price - extreme,
                Side::Short => extreme - entry_price,
            };
            stop_distance = stop_distance.max(structure_distance);
        }

        let sign = side.sign();
        Self {
            stop_distance,
            stop_loss: entry_price - sign * stop_distance,
            take_profit: entry_price + sign * stop_distance * risk.risk_reward_ratio,
            activation_price: entry_price
                + sign * stop_distance * risk.trailing_stop_activation_rr,
        }
    }

    /// A plan is tradable only with a finite, strictly positive distance.
    pub fn is_valid(&self) -> bool {
        self.stop_distance.is_finite() && self.stop_distance > 0.0
    }
}

/// Exit triggered by the stop engine on a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exit {
    pub price: f64,
    pub reason: ExitReason,
}

/// Advance `position` through `bar` and report an exit if one triggers.
///
/// The caller removes the position on `Some`.
pub fn evaluate_bar(position: &mut Position, bar: &Bar) -> Option<Exit> {
    let (favorable, adverse) = match position.side {
        Side::Long => (bar.high, bar.low),
        Side::Short => (bar.low, bar.high),
    };

    if !position.trailing_active && reached(position.side, favorable, position.activation_price) {
        position.trailing_active = true;
    }

    if position.trailing_active {
        position.peak_price = match position.side {
            Side::Long => position.peak_price.max(favorable),
            Side::Short => position.peak_price.min(favorable),
        };
        let trail = position.peak_price * (1.0 - position.side.sign() * position.callback_rate);
        position.stop.propose(trail);
    }

    let stop = position.stop_loss();
    if reached(position.side, stop, adverse) {
        let reason = if position.trailing_active {
            ExitReason::TrailingStop
        } else {
            ExitReason::StopLoss
        };
        return Some(Exit {
            price: stop,
            reason,
        });
    }

    if !position.trailing_active && reached(position.side, favorable, position.take_profit) {
        return Some(Exit {
            price: position.take_profit,
            reason: ExitReason::TakeProfit,
        });
    }

    None
}

/// `price` is at or beyond `level` in the side's favorable direction.
fn reached(side: Side, price: f64, level: f64) -> bool {
    match side {
        Side::Long => price >= level,
        Side::Short => price <= level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(t0(), open, high, low, close)
    }

    fn open_position(side: Side, risk: &RiskConfig) -> Position {
        let plan = StopPlan::compute(side, 100.0, 2.0, None, risk);
        Position::open(side, 100.0, t0(), &plan, 500.0, 50.0, risk.callback_rate())
    }

    #[test]
    fn plan_uses_volatility_distance() {
        let risk = RiskConfig::default();
        let plan = StopPlan::compute(Side::Long, 100.0, 2.0, None, &risk);
        assert_eq!(plan.stop_distance, 4.0);
        assert_eq!(plan.stop_loss, 96.0);
        assert_eq!(plan.take_profit, 108.0);
        assert_eq!(plan.activation_price, 106.0);
    }

    #[test]
    fn plan_respects_minimum_stop_pct() {
        let risk = RiskConfig::default();
        let plan = StopPlan::compute(Side::Short, 100.0, 0.1, None, &risk);
        assert!((plan.stop_distance - 0.5).abs() < 1e-12);
        assert!((plan.stop_loss - 100.5).abs() < 1e-12);
        assert!((plan.take_profit - 99.0).abs() < 1e-12);
    }

    #[test]
    fn structure_widens_but_never_tightens() {
        let risk = RiskConfig::default();
        let wide = StopPlan::compute(Side::Long, 100.0, 2.0, Some(93.0), &risk);
        assert_eq!(wide.stop_distance, 7.0);
        let inside = StopPlan::compute(Side::Long, 100.0, 2.0, Some(99.0), &risk);
        assert_eq!(inside.stop_distance, 4.0);
        let short = StopPlan::compute(Side::Short, 100.0, 2.0, Some(106.0), &risk);
        assert_eq!(short.stop_distance, 6.0);
        assert_eq!(short.stop_loss, 106.0);
    }

    #[test]
    fn zero_distance_plan_is_invalid() {
        let risk = RiskConfig {
            atr_multiplier_sl: 0.0,
            min_sl_pct: 0.0,
            ..RiskConfig::default()
        };
        let plan = StopPlan::compute(Side::Long, 100.0, 2.0, None, &risk);
        assert!(!plan.is_valid());
    }

    #[test]
    fn long_stop_hit_at_stop_level() {
        let risk = RiskConfig::default();
        let mut pos = open_position(Side::Long, &risk);
        let exit = evaluate_bar(&mut pos, &bar(99.0, 100.0, 95.0, 97.0)).unwrap();
        assert_eq!(exit.price, 96.0);
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert!((pos.price_return(exit.price) + 0.04).abs() < 1e-12);
    }

    #[test]
    fn stop_wins_when_both_levels_inside_bar() {
        let risk = RiskConfig {
            trailing_stop_activation_rr: 10.0,
            ..RiskConfig::default()
        };
        let mut pos = open_position(Side::Long, &risk);
        let exit = evaluate_bar(&mut pos, &bar(100.0, 109.0, 95.0, 100.0)).unwrap();
        assert_eq!(exit.price, 96.0);
        assert_eq!(exit.reason, ExitReason::StopLoss);
    }

    #[test]
    fn take_profit_when_not_trailing() {
        let risk = RiskConfig {
            trailing_stop_activation_rr: 10.0,
            ..RiskConfig::default()
        };
        let mut pos = open_position(Side::Short, &risk);
        let exit = evaluate_bar(&mut pos, &bar(100.0, 101.0, 91.0, 93.0)).unwrap();
        assert_eq!(exit.price, 92.0);
        assert_eq!(exit.reason, ExitReason::TakeProfit);
    }

    #[test]
    fn trailing_supersedes_take_profit() {
        let risk = RiskConfig::default();
        let mut pos = open_position(Side::Long, &risk);
        // High 110 arms trailing (activation 106) and passes target 108.
        // Trail stop = 110 * 0.995 = 109.45, low 109.5 does not touch it.
        let exit = evaluate_bar(&mut pos, &bar(107.0, 110.0, 109.5, 109.8));
        assert!(exit.is_none());
        assert!(pos.trailing_active);
        assert_eq!(pos.peak_price, 110.0);
        assert!((pos.stop_loss() - 109.45).abs() < 1e-9);
    }

    #[test]
    fn trailing_exit_reports_trailing_stop() {
        let risk = RiskConfig::default();
        let mut pos = open_position(Side::Short, &risk);
        // Activation for short at 94. Low 90 arms trailing; stop = 90.45.
        let exit = evaluate_bar(&mut pos, &bar(95.0, 91.0, 90.0, 90.8)).unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStop);
        assert!((exit.price - 90.45).abs() < 1e-9);
    }

    #[test]
    fn trailing_stop_never_loosens() {
        let risk = RiskConfig::default();
        let mut pos = open_position(Side::Long, &risk);
        evaluate_bar(&mut pos, &bar(105.0, 112.0, 111.5, 111.8));
        let after_peak = pos.stop_loss();
        // Lower high: peak stays, stop unchanged.
        evaluate_bar(&mut pos, &bar(111.6, 111.7, 111.5, 111.6));
        assert_eq!(pos.stop_loss(), after_peak);
    }
}
