//! Capital ledger — realized equity, margin commitments, drawdown, liquidation.
//!
//! Equity changes only on realized closes. Unrealized pnl enters through
//! [`CapitalLedger::mark_to_market`] for drawdown and curve reporting and is
//! never used for sizing.
//!
//! Liquidation is terminal: once marked, every mutating call is a no-op.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::StrategyKey;

#[derive(Debug, Clone)]
pub struct CapitalLedger {
    start_capital: f64,
    equity: f64,
    peak_equity: f64,
    /// Largest drawdown from peak seen so far, in percent.
    max_drawdown_pct: f64,
    max_drawdown_at: Option<DateTime<Utc>>,
    min_equity: f64,
    last_marked: f64,
    liquidated_at: Option<DateTime<Utc>>,
    margin_by_key: BTreeMap<StrategyKey, f64>,
}

impl CapitalLedger {
    pub fn new(start_capital: f64) -> Self {
        Self {
            start_capital,
            equity: start_capital,
            peak_equity: start_capital,
            max_drawdown_pct: 0.0,
            max_drawdown_at: None,
            min_equity: start_capital,
            last_marked: start_capital,
            liquidated_at: None,
            margin_by_key: BTreeMap::new(),
        }
    }

    /// Book a realized close (net of fees).
    pub fn realize(&mut self, pnl: f64) {
        if self.is_liquidated() {
            return;
        }
        self.equity += pnl;
    }

    /// Reserve margin for `key`'s newly opened position.
    pub fn commit_margin(&mut self, key: &StrategyKey, margin: f64) {
        if self.is_liquidated() {
            return;
        }
        self.margin_by_key.insert(key.clone(), margin);
    }

    /// Free the margin held by `key`, returning the released amount.
    pub fn release_margin(&mut self, key: &StrategyKey) -> Option<f64> {
        if self.is_liquidated() {
            return None;
        }
        self.margin_by_key.remove(key)
    }

    /// Recompute marked equity from realized equity plus `unrealized_total`,
    /// advance peak and drawdown, and detect liquidation.
    ///
    /// Returns the marked equity. After liquidation, returns the last marked
    /// value unchanged.
    pub fn mark_to_market(&mut self, unrealized_total: f64, at: DateTime<Utc>) -> f64 {
        if self.is_liquidated() {
            return self.last_marked;
        }

        let marked = self.equity + unrealized_total;
        self.last_marked = marked;
        self.peak_equity = self.peak_equity.max(marked);
        self.min_equity = self.min_equity.min(marked);

        if self.peak_equity > 0.0 {
            let drawdown_pct = (self.peak_equity - marked) / self.peak_equity * 100.0;
            if drawdown_pct > self.max_drawdown_pct {
                self.max_drawdown_pct = drawdown_pct;
                self.max_drawdown_at = Some(at);
            }
        }

        if marked <= 0.0 || self.equity <= 0.0 {
            self.liquidated_at = Some(at);
        }

        marked
    }

    pub fn is_liquidated(&self) -> bool {
        self.liquidated_at.is_some()
    }

    pub fn liquidated_at(&self) -> Option<DateTime<Utc>> {
        self.liquidated_at
    }

    pub fn start_capital(&self) -> f64 {
        self.start_capital
    }

    /// Realized equity.
    pub fn equity(&self) -> f64 {
        self.equity
    }

    /// Equity at the most recent mark.
    pub fn marked_equity(&self) -> f64 {
        self.last_marked
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    /// Current drawdown from peak at the last mark, in percent.
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_equity > 0.0 {
            (self.peak_equity - self.last_marked) / self.peak_equity * 100.0
        } else {
            0.0
        }
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    pub fn max_drawdown_at(&self) -> Option<DateTime<Utc>> {
        self.max_drawdown_at
    }

    pub fn min_equity(&self) -> f64 {
        self.min_equity
    }

    pub fn margin_for(&self, key: &StrategyKey) -> Option<f64> {
        self.margin_by_key.get(key).copied()
    }

    pub fn used_margin(&self) -> f64 {
        self.margin_by_key.values().sum()
    }

    /// Realized equity not committed as margin.
    pub fn free_equity(&self) -> f64 {
        self.equity - self.used_margin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn realize_moves_equity() {
        let mut ledger = CapitalLedger::new(1000.0);
        ledger.realize(25.0);
        ledger.realize(-5.0);
        assert_eq!(ledger.equity(), 1020.0);
    }

    #[test]
    fn unrealized_does_not_touch_realized_equity() {
        let mut ledger = CapitalLedger::new(1000.0);
        let marked = ledger.mark_to_market(50.0, at(1));
        assert_eq!(marked, 1050.0);
        assert_eq!(ledger.equity(), 1000.0);
        assert_eq!(ledger.peak_equity(), 1050.0);
    }

    #[test]
    fn drawdown_tracked_with_timestamp() {
        let mut ledger = CapitalLedger::new(1000.0);
        ledger.mark_to_market(0.0, at(1));
        ledger.realize(-100.0);
        ledger.mark_to_market(0.0, at(2));
        ledger.realize(50.0);
        ledger.mark_to_market(0.0, at(3));
        assert!((ledger.max_drawdown_pct() - 10.0).abs() < 1e-12);
        assert_eq!(ledger.max_drawdown_at(), Some(at(2)));
        assert!((ledger.drawdown_pct() - 5.0).abs() < 1e-12);
        assert_eq!(ledger.min_equity(), 900.0);
    }

    #[test]
    fn margin_commit_and_release() {
        let mut ledger = CapitalLedger::new(1000.0);
        let btc = StrategyKey::new("BTC_4h");
        let eth = StrategyKey::new("ETH_1h");
        ledger.commit_margin(&btc, 50.0);
        ledger.commit_margin(&eth, 30.0);
        assert_eq!(ledger.used_margin(), 80.0);
        assert_eq!(ledger.free_equity(), 920.0);
        assert_eq!(ledger.release_margin(&btc), Some(50.0));
        assert_eq!(ledger.release_margin(&btc), None);
        assert_eq!(ledger.free_equity(), 970.0);
    }

    #[test]
    fn liquidation_is_terminal() {
        let mut ledger = CapitalLedger::new(100.0);
        ledger.realize(-120.0);
        ledger.mark_to_market(0.0, at(4));
        assert!(ledger.is_liquidated());
        assert_eq!(ledger.liquidated_at(), Some(at(4)));

        ledger.realize(500.0);
        ledger.commit_margin(&StrategyKey::new("X"), 10.0);
        let marked = ledger.mark_to_market(1000.0, at(5));
        assert_eq!(ledger.equity(), -20.0);
        assert_eq!(marked, -20.0);
        assert_eq!(ledger.used_margin(), 0.0);
        assert_eq!(ledger.liquidated_at(), Some(at(4)));
    }

    #[test]
    fn marked_equity_below_zero_liquidates() {
        let mut ledger = CapitalLedger::new(100.0);
        ledger.mark_to_market(-150.0, at(2));
        assert!(ledger.is_liquidated());
        assert_eq!(ledger.max_drawdown_pct(), 150.0);
    }
}
