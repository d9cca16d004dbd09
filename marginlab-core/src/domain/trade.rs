//! TradeRecord — an immutable log entry appended on every close.

use super::ids::StrategyKey;
use super::position::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
}

/// Same spelling as the serde form.
impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TrailingStop => write!(f, "trailing_stop"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// A completed round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub key: StrategyKey,
    pub symbol: String,
    pub side: Side,

    // ── Entry ──
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    /// Close time.
    pub timestamp: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size / PnL ──
    pub notional: f64,
    /// Round-trip fees on notional.
    pub fees: f64,
    /// Net pnl after fees.
    pub realized_pnl: f64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.realized_pnl > 0.0
    }
}
