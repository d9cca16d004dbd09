//! MarginLab Core — margin-aware trade simulation engine.
//!
//! This crate contains the simulation heart:
//! - Domain types (bars, pending orders, positions, trades)
//! - Position sizer with leverage and exchange limits
//! - Stop engine with ratcheting trailing stop
//! - Capital ledger with drawdown and liquidation
//! - Signal source and filter seams
//! - Single-strategy and shared-capital portfolio drivers

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod signal;
pub mod sizer;
pub mod stops;

pub use config::{EngineConfig, ExchangeConstraints, RiskConfig, SignalConfig, TradingMode};
pub use error::SimError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core types are Send + Sync so independent runs
    /// can be spread across worker threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::StrategyState>();
        require_sync::<domain::StrategyState>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();
        require_send::<domain::StrategyKey>();
        require_sync::<domain::StrategyKey>();

        // Config
        require_send::<RiskConfig>();
        require_sync::<RiskConfig>();
        require_send::<EngineConfig>();
        require_sync::<EngineConfig>();

        // Engine types
        require_send::<ledger::CapitalLedger>();
        require_sync::<ledger::CapitalLedger>();
        require_send::<engine::SimulationResult>();
        require_sync::<engine::SimulationResult>();
        require_send::<engine::PortfolioResult>();
        require_sync::<engine::PortfolioResult>();
        require_send::<engine::Strategy<'static>>();
        require_sync::<engine::Strategy<'static>>();

        // Signal concrete types
        require_send::<signal::ScoreSignal>();
        require_sync::<signal::ScoreSignal>();
        require_send::<signal::EntryFilter>();
        require_sync::<signal::EntryFilter>();
    }

    /// Architecture contract: signal sources and filters never see portfolio
    /// state. `evaluate()` takes only the bar (and bias / reading).
    #[test]
    fn signal_traits_have_no_portfolio_parameter() {
        fn _check_source(
            source: &dyn signal::SignalSource,
            bar: &domain::Bar,
        ) -> Option<signal::SignalReading> {
            source.evaluate(bar, None)
        }
        fn _check_filter(
            filter: &dyn signal::SignalFilter,
            reading: &signal::SignalReading,
            bar: &domain::Bar,
        ) -> signal::FilterVerdict {
            filter.evaluate(reading, bar)
        }
    }
}
