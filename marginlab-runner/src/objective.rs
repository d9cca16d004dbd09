//! Trial objective: one parameter bundle, one backtest, one score.
//!
//! Pure function of its inputs. Runs that breach the drawdown limit are cut
//! short through the engine's early-stop hook.

use marginlab_core::domain::Bar;
use marginlab_core::engine::{run_backtest_with_control, BarProgress, SimulationResult};
use marginlab_core::signal::{EntryFilter, ScoreSignal};
use marginlab_core::{EngineConfig, RiskConfig, SignalConfig, SimError};
use serde::{Deserialize, Serialize};

/// Everything a trial varies.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamSet {
    pub risk: RiskConfig,
    pub signal: SignalConfig,
}

impl ParamSet {
    /// BLAKE3 hash of the canonical JSON form. Identical bundles share an id.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}

/// Acceptance thresholds for a trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneRules {
    /// Percent.
    pub max_drawdown_pct: f64,
    pub min_trades: usize,
    /// Percent.
    pub min_pnl_pct: f64,
}

impl Default for PruneRules {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 40.0,
            min_trades: 10,
            min_pnl_pct: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PruneReason {
    InsufficientData,
    InvalidParams,
    Liquidated,
    ExcessiveDrawdown { drawdown_pct: f64 },
    TooFewTrades { trades: usize },
    Unprofitable { pnl_pct: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    /// Accepted; the score is `total_pnl_pct`.
    Scored { score: f64, trades: usize, max_drawdown_pct: f64 },
    Pruned(PruneReason),
}

impl TrialOutcome {
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Scored { score, .. } => Some(*score),
            Self::Pruned(_) => None,
        }
    }
}

/// Backtest `bars` with `params` and judge the result against `rules`.
///
/// Invalid parameter bundles are pruned rather than reported as errors;
/// malformed bars still fail the call.
pub fn evaluate_trial(
    bars: &[Bar],
    params: &ParamSet,
    engine: &EngineConfig,
    rules: &PruneRules,
) -> Result<TrialOutcome, SimError> {
    if params.risk.validate().is_err() || params.signal.validate().is_err() {
        return Ok(TrialOutcome::Pruned(PruneReason::InvalidParams));
    }

    let result = run_params(bars, params, engine, rules)?;
    Ok(judge(&result, rules))
}

fn run_params(
    bars: &[Bar],
    params: &ParamSet,
    engine: &EngineConfig,
    rules: &PruneRules,
) -> Result<SimulationResult, SimError> {
    let signal = ScoreSignal::from_config(&params.signal);
    let filter = EntryFilter::new(params.signal);
    let limit = rules.max_drawdown_pct;
    let mut prune_on_drawdown = |progress: &BarProgress| progress.drawdown_pct > limit;
    run_backtest_with_control(
        bars,
        &params.risk,
        &signal,
        &filter,
        engine,
        &mut prune_on_drawdown,
    )
}

/// Apply the prune rules to a finished run.
pub fn judge(result: &SimulationResult, rules: &PruneRules) -> TrialOutcome {
    let reason = if result.insufficient_data {
        Some(PruneReason::InsufficientData)
    } else if result.liquidated {
        Some(PruneReason::Liquidated)
    } else if result.stopped_early || result.max_drawdown_pct > rules.max_drawdown_pct {
        Some(PruneReason::ExcessiveDrawdown {
            drawdown_pct: result.max_drawdown_pct,
        })
    } else if result.trades_count < rules.min_trades {
        Some(PruneReason::TooFewTrades {
            trades: result.trades_count,
        })
    } else if result.total_pnl_pct < rules.min_pnl_pct {
        Some(PruneReason::Unprofitable {
            pnl_pct: result.total_pnl_pct,
        })
    } else {
        None
    };

    match reason {
        Some(reason) => TrialOutcome::Pruned(reason),
        None => TrialOutcome::Scored {
            score: result.total_pnl_pct,
            trades: result.trades_count,
            max_drawdown_pct: result.max_drawdown_pct,
        },
    }
}
