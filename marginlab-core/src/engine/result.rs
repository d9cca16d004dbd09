//! Run outputs for single-strategy and portfolio calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{StrategyKey, TradeRecord};
use crate::ledger::CapitalLedger;

/// One point of the marked equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Realized equity plus unrealized pnl of open positions.
    pub equity: f64,
    pub peak: f64,
    /// Drawdown from `peak`, in percent.
    pub drawdown_pct: f64,
}

/// Aggregate output of a single-strategy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub total_pnl_pct: f64,
    pub trades_count: usize,
    /// Percent of trades with positive net pnl.
    pub win_rate: f64,
    /// Percent, 0–100 (may exceed 100 when marked equity goes negative).
    pub max_drawdown_pct: f64,
    /// Realized equity at the end of the run.
    pub end_capital: f64,
    pub liquidated: bool,
    pub stopped_early: bool,
    /// Set when the input was too short to simulate.
    pub insufficient_data: bool,
    pub trades: Vec<TradeRecord>,
}

impl SimulationResult {
    /// Result for an input too short to simulate: full loss, no trades.
    /// Optimization loops rank it last without special-casing.
    pub fn insufficient_data(start_capital: f64) -> Self {
        Self {
            total_pnl_pct: -100.0,
            trades_count: 0,
            win_rate: 0.0,
            max_drawdown_pct: 100.0,
            end_capital: start_capital,
            liquidated: false,
            stopped_early: false,
            insufficient_data: true,
            trades: Vec::new(),
        }
    }

    pub(crate) fn from_run(run: RunOutcome) -> Self {
        let ledger = &run.ledger;
        let start = ledger.start_capital();
        Self {
            total_pnl_pct: (ledger.equity() - start) / start * 100.0,
            trades_count: run.trades.len(),
            win_rate: win_rate(&run.trades),
            max_drawdown_pct: ledger.max_drawdown_pct(),
            end_capital: ledger.equity(),
            liquidated: ledger.is_liquidated(),
            stopped_early: run.stopped_early,
            insufficient_data: false,
            trades: run.trades,
        }
    }
}

/// Aggregate output of a shared-capital portfolio run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResult {
    pub start_capital: f64,
    /// Last marked equity (realized plus open positions' unrealized pnl).
    pub end_capital: f64,
    pub total_pnl_pct: f64,
    pub trades_count: usize,
    pub win_rate: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_date: Option<DateTime<Utc>>,
    pub min_equity: f64,
    pub liquidation_date: Option<DateTime<Utc>>,
    pub stopped_early: bool,
    pub equity_curve: Vec<EquityPoint>,
    pub pnl_per_strategy: BTreeMap<StrategyKey, f64>,
    pub trades_per_strategy: BTreeMap<StrategyKey, usize>,
    pub trades: Vec<TradeRecord>,
}

impl PortfolioResult {
    pub(crate) fn from_run(run: RunOutcome) -> Self {
        let ledger = &run.ledger;
        let start = ledger.start_capital();
        let end = run.equity_curve.last().map_or(start, |p| p.equity);

        let mut pnl_per_strategy: BTreeMap<StrategyKey, f64> = BTreeMap::new();
        let mut trades_per_strategy: BTreeMap<StrategyKey, usize> = BTreeMap::new();
        for key in &run.keys {
            pnl_per_strategy.insert(key.clone(), 0.0);
            trades_per_strategy.insert(key.clone(), 0);
        }
        for trade in &run.trades {
            *pnl_per_strategy.entry(trade.key.clone()).or_default() += trade.realized_pnl;
            *trades_per_strategy.entry(trade.key.clone()).or_default() += 1;
        }

        Self {
            start_capital: start,
            end_capital: end,
            total_pnl_pct: (end / start - 1.0) * 100.0,
            trades_count: run.trades.len(),
            win_rate: win_rate(&run.trades),
            max_drawdown_pct: ledger.max_drawdown_pct(),
            max_drawdown_date: ledger.max_drawdown_at(),
            min_equity: ledger.min_equity(),
            liquidation_date: ledger.liquidated_at(),
            stopped_early: run.stopped_early,
            equity_curve: run.equity_curve,
            pnl_per_strategy,
            trades_per_strategy,
            trades: run.trades,
        }
    }

    /// Final ledger view as a single-strategy style summary.
    pub fn summary(&self) -> SimulationResult {
        SimulationResult {
            total_pnl_pct: self.total_pnl_pct,
            trades_count: self.trades_count,
            win_rate: self.win_rate,
            max_drawdown_pct: self.max_drawdown_pct,
            end_capital: self.end_capital,
            liquidated: self.liquidation_date.is_some(),
            stopped_early: self.stopped_early,
            insufficient_data: false,
            trades: self.trades.clone(),
        }
    }
}

/// Everything the driver produced, before shaping into a result type.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub ledger: CapitalLedger,
    pub keys: Vec<StrategyKey>,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub stopped_early: bool,
}

fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.is_winner()).count();
    wins as f64 / trades.len() as f64 * 100.0
}
