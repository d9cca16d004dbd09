//! Run pipeline — wires config, data loading, engine, and export.
//!
//! Entry points:
//! - `run_portfolio_from_config()`: every `[[strategy]]` on one shared ledger.
//! - `walk_forward_from_config()`: walk-forward per strategy with random search.
//! - `run_and_save()` / `walk_forward_and_save()`: path-in, artifacts-out
//!   convenience wrappers with contextual errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use marginlab_core::domain::{Bar, StrategyKey};
use marginlab_core::engine::{run_portfolio, NeverStop, PortfolioResult, Strategy};
use marginlab_core::signal::{EntryFilter, ScoreSignal};
use marginlab_core::SimError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{RunConfig, RunConfigError, RunId, StrategyEntry};
use crate::data_loader::{dataset_hash, load_bars_csv, LoadError};
use crate::export::{save_portfolio_artifacts, save_walk_forward_report};
use crate::search::RandomSearch;
use crate::walk_forward::{run_walk_forward, WalkForwardError, WalkForwardReport};

/// Current schema version for persisted run summaries.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] RunConfigError),

    #[error("failed to load bars for '{key}'")]
    Load {
        key: String,
        #[source]
        source: LoadError,
    },

    #[error("simulation error: {0}")]
    Simulation(#[from] SimError),

    #[error("walk-forward failed for '{key}'")]
    WalkForward {
        key: String,
        #[source]
        source: WalkForwardError,
    },
}

/// A strategy entry with its bars in memory.
#[derive(Debug, Clone)]
pub struct LoadedStrategy {
    pub entry: StrategyEntry,
    pub key: StrategyKey,
    pub bars: Vec<Bar>,
    pub dataset_hash: String,
}

/// Load every strategy's bar file, in parallel.
pub fn load_strategies(config: &RunConfig) -> Result<Vec<LoadedStrategy>, RunError> {
    config
        .strategies
        .par_iter()
        .map(|entry| -> Result<LoadedStrategy, RunError> {
            let bars = load_bars_csv(&entry.bars).map_err(|source| RunError::Load {
                key: entry.key.clone(),
                source,
            })?;
            Ok(LoadedStrategy {
                key: entry.strategy_key(),
                dataset_hash: dataset_hash(&bars),
                bars,
                entry: entry.clone(),
            })
        })
        .collect()
}

/// Portfolio run plus the provenance needed to reproduce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRun {
    pub schema_version: u32,
    pub run_id: RunId,
    /// Dataset hash per strategy key.
    pub datasets: BTreeMap<String, String>,
    pub result: PortfolioResult,
}

/// Run pre-loaded strategies on one shared capital pool. No I/O.
pub fn run_loaded_portfolio(
    config: &RunConfig,
    loaded: &[LoadedStrategy],
) -> Result<PortfolioResult, SimError> {
    let signals: Vec<ScoreSignal> = loaded
        .iter()
        .map(|l| ScoreSignal::from_config(&l.entry.signal))
        .collect();
    let filters: Vec<EntryFilter> = loaded.iter().map(|l| EntryFilter::new(l.entry.signal)).collect();

    let strategies: Vec<Strategy<'_>> = loaded
        .iter()
        .zip(&signals)
        .zip(&filters)
        .map(|((l, signal), filter)| Strategy {
            key: &l.key,
            symbol: &l.entry.symbol,
            bars: &l.bars,
            risk: &l.entry.risk,
            signal,
            filter,
        })
        .collect();

    run_portfolio(&strategies, &config.engine, &mut NeverStop)
}

pub fn run_portfolio_from_config(config: &RunConfig) -> Result<PortfolioRun, RunError> {
    let loaded = load_strategies(config)?;
    let result = run_loaded_portfolio(config, &loaded)?;
    Ok(PortfolioRun {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        datasets: loaded
            .iter()
            .map(|l| (l.entry.key.clone(), l.dataset_hash.clone()))
            .collect(),
        result,
    })
}

/// Walk-forward each strategy on its own bars. Strategies run one after
/// another; windows and trials inside each run in parallel.
pub fn walk_forward_from_config(
    config: &RunConfig,
) -> Result<BTreeMap<String, WalkForwardReport>, RunError> {
    let loaded = load_strategies(config)?;
    let wf = &config.walk_forward;

    let mut reports = BTreeMap::new();
    for l in &loaded {
        let search = RandomSearch::new(wf.trials, wf.seed).with_base_signal(l.entry.signal);
        let report = run_walk_forward(&l.bars, wf, &search, &config.engine).map_err(|source| {
            RunError::WalkForward {
                key: l.entry.key.clone(),
                source,
            }
        })?;
        reports.insert(l.entry.key.clone(), report);
    }
    Ok(reports)
}

/// Load `config_path`, run the portfolio, and save artifacts under
/// `output_dir/<run id prefix>/`. Returns the artifact directory.
pub fn run_and_save(config_path: &Path, output_dir: &Path) -> anyhow::Result<PathBuf> {
    let config = RunConfig::from_path(config_path)
        .with_context(|| format!("loading run config {}", config_path.display()))?;
    let run = run_portfolio_from_config(&config).context("running portfolio")?;

    let run_name = format!("run_{}", &run.run_id[..12.min(run.run_id.len())]);
    let dir = save_portfolio_artifacts(&run.result, output_dir, &run_name)
        .context("saving portfolio artifacts")?;
    let summary = serde_json::to_string_pretty(&run).context("serializing run summary")?;
    std::fs::write(dir.join("run.json"), summary)
        .with_context(|| format!("writing run summary to {}", dir.display()))?;
    Ok(dir)
}

/// Load `config_path`, walk forward every strategy, and save one report per
/// strategy under `output_dir`.
pub fn walk_forward_and_save(config_path: &Path, output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let config = RunConfig::from_path(config_path)
        .with_context(|| format!("loading run config {}", config_path.display()))?;
    let reports = walk_forward_from_config(&config).context("running walk-forward")?;

    reports
        .iter()
        .map(|(key, report)| {
            save_walk_forward_report(report, output_dir, key)
                .with_context(|| format!("saving walk-forward report for '{key}'"))
        })
        .collect()
}
