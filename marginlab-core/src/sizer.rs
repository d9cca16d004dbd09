//! Position sizer — fixed-fractional risk under leverage and exchange limits.
//!
//! # Formula
//! ```text
//! risk_usd      = equity * min(risk_pct, 2%) / 100
//! raw_notional  = risk_usd / (stop_distance / entry_price)
//! notional      = min(raw_notional, equity * max_effective_leverage, max_notional)
//! margin        = ceil(notional / leverage, 2 decimals)
//! ```
//!
//! # Example
//! - Equity: $1,000, risk 1% → $10
//! - Stop distance 2% of entry → raw notional $500
//! - Leverage cap $10,000 → notional $500
//! - Leverage 10 → margin $50
//!
//! Rejections are outcomes, not errors: the pending order is discarded and
//! the run continues.

use serde::{Deserialize, Serialize};

use crate::config::{ExchangeConstraints, RiskConfig};

/// Inputs for one sizing decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingRequest {
    /// Realized equity.
    pub equity: f64,
    /// Equity not committed as margin to other open positions.
    pub free_equity: f64,
    pub entry_price: f64,
    pub stop_distance: f64,
}

/// An accepted order size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizedOrder {
    pub risk_usd: f64,
    pub notional: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InvalidStopDistance,
    InvalidEntryPrice,
    BelowMinNotional,
    MarginExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingOutcome {
    Accepted(SizedOrder),
    Rejected(RejectReason),
}

impl SizingOutcome {
    pub fn accepted(&self) -> Option<&SizedOrder> {
        match self {
            Self::Accepted(order) => Some(order),
            Self::Rejected(_) => None,
        }
    }
}

/// Round up to whole cents.
pub fn round_margin(value: f64) -> f64 {
    (value * 100.0).ceil() / 100.0
}

/// Size a position for `request` under `risk` and exchange `limits`.
pub fn size_position(
    request: &SizingRequest,
    risk: &RiskConfig,
    limits: &ExchangeConstraints,
) -> SizingOutcome {
    if !(request.stop_distance.is_finite() && request.stop_distance > 0.0) {
        return SizingOutcome::Rejected(RejectReason::InvalidStopDistance);
    }
    if !(request.entry_price.is_finite() && request.entry_price > 0.0) {
        return SizingOutcome::Rejected(RejectReason::InvalidEntryPrice);
    }

    let risk_usd = request.equity * risk.effective_risk_pct() / 100.0;
    let stop_fraction = request.stop_distance / request.entry_price;
    let raw_notional = risk_usd / stop_fraction;
    let leverage_cap = request.equity * limits.max_effective_leverage;
    let notional = raw_notional.min(leverage_cap).min(limits.max_notional);

    if !(notional >= limits.min_notional) {
        return SizingOutcome::Rejected(RejectReason::BelowMinNotional);
    }

    let margin = round_margin(notional / f64::from(risk.leverage.max(1)));
    if margin > request.free_equity {
        return SizingOutcome::Rejected(RejectReason::MarginExceeded);
    }

    SizingOutcome::Accepted(SizedOrder {
        risk_usd,
        notional,
        margin,
    })
}
