//! Seeded random search over risk and filter parameters.
//!
//! Trial `i` draws its parameters from an RNG seeded by mixing the master
//! seed with `i`, so the same seed yields the same trials whether they run
//! in parallel or sequentially.

use marginlab_core::domain::Bar;
use marginlab_core::{EngineConfig, RiskConfig, SignalConfig, SimError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::objective::{evaluate_trial, ParamSet, PruneRules, TrialOutcome};

/// Finds the best parameter bundle for a training slice.
///
/// Implementations must be deterministic for a given input.
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when no trial survives pruning.
    fn optimize(&self, bars: &[Bar], engine: &EngineConfig) -> Result<Option<ParamSet>, SimError>;
}

/// Closed sampling ranges for each tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSpace {
    pub risk_reward_ratio: (f64, f64),
    pub risk_per_trade_pct: (f64, f64),
    pub leverage: (u32, u32),
    pub atr_multiplier_sl: (f64, f64),
    pub min_sl_pct: (f64, f64),
    pub trailing_stop_activation_rr: (f64, f64),
    pub trailing_stop_callback_rate_pct: (f64, f64),
    /// Sampled on a 0.1 grid.
    pub min_score: (f64, f64),
    /// Integer grid; half of the trials leave the ADX gate off.
    pub adx_threshold: (u32, u32),
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self {
            risk_reward_ratio: (1.5, 5.0),
            risk_per_trade_pct: (0.5, 2.0),
            leverage: (5, 25),
            atr_multiplier_sl: (1.0, 4.0),
            min_sl_pct: (0.3, 2.0),
            trailing_stop_activation_rr: (1.0, 3.0),
            trailing_stop_callback_rate_pct: (0.5, 3.0),
            min_score: (0.5, 2.0),
            adx_threshold: (15, 35),
        }
    }
}

impl ParamSpace {
    /// Draw one bundle. Trading mode, choppy flag and volume gate come from `base`.
    pub fn sample<R: Rng>(&self, rng: &mut R, base: &SignalConfig) -> ParamSet {
        let risk = RiskConfig {
            risk_reward_ratio: uniform(rng, self.risk_reward_ratio),
            risk_per_trade_pct: uniform(rng, self.risk_per_trade_pct),
            leverage: rng.gen_range(self.leverage.0..=self.leverage.1.max(self.leverage.0)),
            atr_multiplier_sl: uniform(rng, self.atr_multiplier_sl),
            min_sl_pct: uniform(rng, self.min_sl_pct),
            trailing_stop_activation_rr: uniform(rng, self.trailing_stop_activation_rr),
            trailing_stop_callback_rate_pct: uniform(rng, self.trailing_stop_callback_rate_pct),
        };

        let lo = (self.min_score.0 * 10.0).round() as i64;
        let hi = ((self.min_score.1 * 10.0).round() as i64).max(lo);
        let min_score = rng.gen_range(lo..=hi) as f64 / 10.0;
        let adx_threshold = if rng.gen_bool(0.5) {
            let (lo, hi) = self.adx_threshold;
            Some(f64::from(rng.gen_range(lo..=hi.max(lo))))
        } else {
            None
        };

        ParamSet {
            risk,
            signal: SignalConfig {
                min_score,
                adx_threshold,
                ..*base
            },
        }
    }
}

fn uniform<R: Rng>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// One evaluated trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: usize,
    pub fingerprint: String,
    pub params: ParamSet,
    pub outcome: TrialOutcome,
}

/// All trials of one search, in index order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    trials: Vec<TrialRecord>,
}

impl SearchResults {
    pub fn all(&self) -> &[TrialRecord] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn pruned_count(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.outcome.score().is_none())
            .count()
    }

    /// Scored trials, best first. Equal scores keep index order.
    pub fn ranked(&self) -> Vec<&TrialRecord> {
        let mut scored: Vec<&TrialRecord> = self
            .trials
            .iter()
            .filter(|t| t.outcome.score().is_some())
            .collect();
        scored.sort_by(|a, b| {
            let (sa, sb) = (a.outcome.score(), b.outcome.score());
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        scored
    }

    pub fn top_n(&self, n: usize) -> Vec<&TrialRecord> {
        self.ranked().into_iter().take(n).collect()
    }

    pub fn best(&self) -> Option<&TrialRecord> {
        self.ranked().into_iter().next()
    }
}

/// Random search executor.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: ParamSpace,
    base_signal: SignalConfig,
    rules: PruneRules,
    trials: usize,
    seed: u64,
    parallel: bool,
}

impl RandomSearch {
    pub fn new(trials: usize, seed: u64) -> Self {
        Self {
            space: ParamSpace::default(),
            base_signal: SignalConfig::default(),
            rules: PruneRules::default(),
            trials,
            seed,
            parallel: true,
        }
    }

    pub fn with_space(mut self, space: ParamSpace) -> Self {
        self.space = space;
        self
    }

    /// Fixed signal settings (trading mode, choppy flag, volume gate) shared by
    /// all trials.
    pub fn with_base_signal(mut self, base: SignalConfig) -> Self {
        self.base_signal = base;
        self
    }

    pub fn with_rules(mut self, rules: PruneRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Parameters of trial `index`, independent of every other trial.
    pub fn params_for(&self, index: usize) -> ParamSet {
        let mut rng = StdRng::seed_from_u64(trial_seed(self.seed, index));
        self.space.sample(&mut rng, &self.base_signal)
    }

    fn run_trial(
        &self,
        index: usize,
        bars: &[Bar],
        engine: &EngineConfig,
    ) -> Result<TrialRecord, SimError> {
        let params = self.params_for(index);
        let outcome = evaluate_trial(bars, &params, engine, &self.rules)?;
        tracing::trace!(index, outcome = ?outcome, "trial evaluated");
        Ok(TrialRecord {
            index,
            fingerprint: params.fingerprint(),
            params,
            outcome,
        })
    }

    /// Evaluate every trial against `bars`.
    pub fn search(&self, bars: &[Bar], engine: &EngineConfig) -> Result<SearchResults, SimError> {
        let trials: Vec<TrialRecord> = if self.parallel {
            (0..self.trials)
                .into_par_iter()
                .map(|i| self.run_trial(i, bars, engine))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            (0..self.trials)
                .map(|i| self.run_trial(i, bars, engine))
                .collect::<Result<Vec<_>, _>>()?
        };

        let results = SearchResults { trials };
        tracing::debug!(
            trials = results.len(),
            pruned = results.pruned_count(),
            best = ?results.best().and_then(|t| t.outcome.score()),
            "random search finished"
        );
        Ok(results)
    }
}

/// Distinct (seed, index) pairs map to distinct trial seeds.
fn trial_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ index as u64
}

impl Optimizer for RandomSearch {
    fn name(&self) -> &str {
        "random_search"
    }

    fn optimize(&self, bars: &[Bar], engine: &EngineConfig) -> Result<Option<ParamSet>, SimError> {
        let results = self.search(bars, engine)?;
        Ok(results.best().map(|t| t.params))
    }
}
