//! Simulation engine — the chronological bar loop over one or many keys.
//!
//! Each timestamp runs four phases across all keys:
//!
//! 1. Fill pending orders at the open
//! 2. Stop engine checks on open positions
//! 3. Signal generation at the close
//! 4. Ledger mark-to-market, liquidation, early stop

pub mod control;
pub mod driver;
pub mod result;
pub mod state;

pub use control::{BarProgress, EarlyStop, NeverStop};
pub use driver::{run_backtest, run_backtest_with_control, run_portfolio};
pub use result::{EquityPoint, PortfolioResult, SimulationResult};
pub use state::Strategy;
