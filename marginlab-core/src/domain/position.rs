//! Per-key trading state: pending orders and open leveraged positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stops::{StopPlan, StopRatchet};

/// Direction of a position or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// A signal awaiting execution at the key's next bar open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub side: Side,
    /// Reference volatility captured at the signal bar's close.
    pub reference_volatility: f64,
    pub signal_time: DateTime<Utc>,
}

/// Stop engine phase of an open position. `Closed` is represented by the
/// position being removed from its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopPhase {
    Armed,
    Trailing,
}

/// An open leveraged position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_distance: f64,
    /// Ratcheting stop-loss level.
    pub stop: StopRatchet,
    pub take_profit: f64,
    pub notional: f64,
    pub margin_used: f64,
    pub trailing_active: bool,
    pub activation_price: f64,
    /// Most favorable extreme seen while trailing.
    pub peak_price: f64,
    /// Retracement from peak as a fraction (0.005 = 0.5%).
    pub callback_rate: f64,
    /// Last seen close, for unrealized pnl on bars where the key has no data.
    pub last_price: f64,
}

impl Position {
    /// Open a position at `entry_price` from a computed stop plan.
    pub fn open(
        side: Side,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        plan: &StopPlan,
        notional: f64,
        margin_used: f64,
        callback_rate: f64,
    ) -> Self {
        Self {
            side,
            entry_price,
            entry_time,
            stop_distance: plan.stop_distance,
            stop: StopRatchet::with_initial_level(side, plan.stop_loss),
            take_profit: plan.take_profit,
            notional,
            margin_used,
            trailing_active: false,
            activation_price: plan.activation_price,
            peak_price: entry_price,
            callback_rate,
            last_price: entry_price,
        }
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop.level()
    }

    pub fn phase(&self) -> StopPhase {
        if self.trailing_active {
            StopPhase::Trailing
        } else {
            StopPhase::Armed
        }
    }

    /// Fractional price return from entry to `price`, signed by side.
    pub fn price_return(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => price / self.entry_price - 1.0,
            Side::Short => 1.0 - price / self.entry_price,
        }
    }

    /// Unrealized pnl at the last seen close, before fees.
    pub fn unrealized_pnl(&self) -> f64 {
        self.notional * self.price_return(self.last_price)
    }
}

/// Tagged per-key state. A key holds at most one pending order or one open
/// position, never both.
#[derive(Debug, Clone, Default)]
pub enum StrategyState {
    #[default]
    Flat,
    Pending(PendingOrder),
    Open(Position),
}

impl StrategyState {
    pub fn is_flat(&self) -> bool {
        matches!(self, Self::Flat)
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Self::Open(pos) => Some(pos),
            _ => None,
        }
    }
}
