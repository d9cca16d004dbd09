//! MarginLab Runner — run configuration, data loading, optimization, export.
//!
//! This crate builds on `marginlab-core` to provide:
//! - TOML run configuration with per-strategy risk and signal settings
//! - CSV bar loading with schema checks and dataset hashing
//! - A pure trial objective with pruning rules
//! - Seeded, parallel random search behind the `Optimizer` trait
//! - Calendar walk-forward validation
//! - JSON/CSV artifact export and path-in, artifacts-out pipelines

pub mod config;
pub mod data_loader;
pub mod export;
pub mod objective;
pub mod pipeline;
pub mod search;
pub mod walk_forward;

pub use config::{RunConfig, RunConfigError, RunId, StrategyEntry};
pub use data_loader::{dataset_hash, load_bars_csv, read_bars, LoadError};
pub use objective::{evaluate_trial, ParamSet, PruneReason, PruneRules, TrialOutcome};
pub use pipeline::{
    load_strategies, run_and_save, run_loaded_portfolio, run_portfolio_from_config,
    walk_forward_and_save, walk_forward_from_config, LoadedStrategy, PortfolioRun, RunError,
};
pub use search::{Optimizer, ParamSpace, RandomSearch, SearchResults, TrialRecord};
pub use walk_forward::{
    create_windows, run_walk_forward, test_slice, SkipReason, WalkForwardConfig, WalkForwardError,
    WalkForwardReport, WindowResult, WindowSpec,
};
