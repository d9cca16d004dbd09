//! Domain types for the margin simulation engine.

pub mod bar;
pub mod ids;
pub mod position;
pub mod trade;

pub use bar::{link_previous_extremes, Bar, BarError, TrendBias};
pub use ids::StrategyKey;
pub use position::{PendingOrder, Position, Side, StopPhase, StrategyState};
pub use trade::{ExitReason, TradeRecord};
