//! Walk-forward validation over calendar windows.
//!
//! The bar range is cut into rolling windows of `training_months` followed
//! by `testing_months` (30-day months), advancing by `step_months`. Each
//! window optimizes on its training slice, then backtests the winning
//! parameters on the unseen test slice. Windows are independent and run in
//! parallel.

use chrono::{DateTime, Duration, Utc};
use marginlab_core::config::ConfigError;
use marginlab_core::domain::Bar;
use marginlab_core::engine::run_backtest;
use marginlab_core::signal::{EntryFilter, ScoreSignal};
use marginlab_core::{EngineConfig, SimError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_loader::dataset_hash;
use crate::objective::ParamSet;
use crate::search::Optimizer;

const DAYS_PER_MONTH: i64 = 30;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    pub training_months: u32,
    pub testing_months: u32,
    pub step_months: u32,
    /// Windows whose training slice is shorter are skipped.
    pub min_train_bars: usize,
    /// Windows whose test slice is shorter are skipped.
    pub min_test_bars: usize,
    /// Random-search trials per training window.
    pub trials: usize,
    pub seed: u64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            training_months: 6,
            testing_months: 2,
            step_months: 2,
            min_train_bars: 100,
            min_test_bars: 50,
            trials: 50,
            seed: 42,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), WalkForwardError> {
        for (field, months) in [
            ("training_months", self.training_months),
            ("testing_months", self.testing_months),
            ("step_months", self.step_months),
        ] {
            if months == 0 {
                return Err(WalkForwardError::ZeroPeriod(field));
            }
        }
        Ok(())
    }

    fn months(months: u32) -> Duration {
        Duration::days(DAYS_PER_MONTH * i64::from(months))
    }
}

// ─── Windows ─────────────────────────────────────────────────────────

/// One training/test split. Both ranges are half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub index: usize,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("invalid date range: start {start} is not before end {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("'{0}' must be at least one month")]
    ZeroPeriod(&'static str),

    #[error("no data to walk forward over")]
    NoData,

    #[error("bars are not in ascending timestamp order at index {index}")]
    UnorderedBars { index: usize },

    #[error("range of {span_days} days is shorter than one window ({window_days} days)")]
    NoWindows { span_days: i64, window_days: i64 },

    #[error("all {skipped} windows were skipped")]
    NoSuccessfulWindows { skipped: usize },

    #[error("invalid engine config")]
    Config(#[from] ConfigError),

    #[error("optimization failed in window {window}")]
    Optimization {
        window: usize,
        #[source]
        source: SimError,
    },

    #[error("out-of-sample backtest failed in window {window}")]
    Simulation {
        window: usize,
        #[source]
        source: SimError,
    },
}

/// Cut `[start, end]` into rolling windows.
///
/// A window is kept only if its test range ends on or before `end`.
pub fn create_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: &WalkForwardConfig,
) -> Result<Vec<WindowSpec>, WalkForwardError> {
    config.validate()?;
    if start >= end {
        return Err(WalkForwardError::InvalidDateRange { start, end });
    }

    let train = WalkForwardConfig::months(config.training_months);
    let test = WalkForwardConfig::months(config.testing_months);
    let step = WalkForwardConfig::months(config.step_months);

    let mut windows = Vec::new();
    let mut train_start = start;
    loop {
        let train_end = train_start + train;
        let test_end = train_end + test;
        if test_end > end {
            break;
        }
        windows.push(WindowSpec {
            index: windows.len(),
            train_start,
            train_end,
            test_start: train_end,
            test_end,
        });
        train_start += step;
    }

    if windows.is_empty() {
        return Err(WalkForwardError::NoWindows {
            span_days: (end - start).num_days(),
            window_days: (train + test).num_days(),
        });
    }
    Ok(windows)
}

/// Bars with `start <= timestamp < end`. Requires ascending order.
pub fn slice_between(bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
    let lo = bars.partition_point(|b| b.timestamp < start);
    let hi = bars.partition_point(|b| b.timestamp < end).max(lo);
    &bars[lo..hi]
}

/// Test bars of `spec`. Half-open like [`slice_between`], except that a
/// window ending exactly on the final bar includes it.
pub fn test_slice<'a>(bars: &'a [Bar], spec: &WindowSpec) -> &'a [Bar] {
    match bars.last() {
        Some(last) if last.timestamp == spec.test_end => {
            let lo = bars.partition_point(|b| b.timestamp < spec.test_start);
            &bars[lo..]
        }
        _ => slice_between(bars, spec.test_start, spec.test_end),
    }
}

// ─── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub spec: WindowSpec,
    /// BLAKE3 over the window's data and chosen parameters.
    pub fingerprint: String,
    pub params: ParamSet,
    pub train_bars: usize,
    pub test_bars: usize,
    pub oos_pnl_pct: f64,
    pub oos_trades: usize,
    pub oos_win_rate: f64,
    pub oos_max_drawdown_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TooFewTrainingBars { bars: usize, required: usize },
    NoViableParams,
    TooFewTestBars { bars: usize, required: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedWindow {
    pub spec: WindowSpec,
    pub reason: SkipReason,
}

/// Aggregate over the windows that completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub optimizer: String,
    pub total_windows: usize,
    pub profitable_windows: usize,
    /// Percent of completed windows with positive out-of-sample pnl.
    pub consistency_pct: f64,
    pub avg_oos_pnl_pct: f64,
    pub avg_oos_trades: f64,
    pub avg_oos_win_rate: f64,
    pub max_oos_drawdown_pct: f64,
    pub windows: Vec<WindowResult>,
    pub skipped: Vec<SkippedWindow>,
}

impl WalkForwardReport {
    /// `None` when no window completed.
    pub fn from_windows(
        optimizer: &str,
        windows: Vec<WindowResult>,
        skipped: Vec<SkippedWindow>,
    ) -> Option<Self> {
        if windows.is_empty() {
            return None;
        }
        let n = windows.len() as f64;
        let profitable_windows = windows.iter().filter(|w| w.oos_pnl_pct > 0.0).count();
        let max_oos_drawdown_pct = windows
            .iter()
            .map(|w| w.oos_max_drawdown_pct)
            .fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            optimizer: optimizer.to_string(),
            total_windows: windows.len(),
            profitable_windows,
            consistency_pct: profitable_windows as f64 / n * 100.0,
            avg_oos_pnl_pct: windows.iter().map(|w| w.oos_pnl_pct).sum::<f64>() / n,
            avg_oos_trades: windows.iter().map(|w| w.oos_trades as f64).sum::<f64>() / n,
            avg_oos_win_rate: windows.iter().map(|w| w.oos_win_rate).sum::<f64>() / n,
            max_oos_drawdown_pct,
            windows,
            skipped,
        })
    }
}

// ─── Walk-forward orchestration ──────────────────────────────────────

enum WindowOutcome {
    Completed(WindowResult),
    Skipped(SkippedWindow),
}

/// Optimize on each training slice and score the winner out of sample.
pub fn run_walk_forward(
    bars: &[Bar],
    config: &WalkForwardConfig,
    optimizer: &dyn Optimizer,
    engine: &EngineConfig,
) -> Result<WalkForwardReport, WalkForwardError> {
    engine.validate()?;
    let (first, last) = match (bars.first(), bars.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(WalkForwardError::NoData),
    };
    if let Some(index) = (1..bars.len()).find(|&i| bars[i].timestamp <= bars[i - 1].timestamp) {
        return Err(WalkForwardError::UnorderedBars { index });
    }

    let windows = create_windows(first.timestamp, last.timestamp, config)?;
    tracing::info!(
        windows = windows.len(),
        optimizer = optimizer.name(),
        training_months = config.training_months,
        testing_months = config.testing_months,
        step_months = config.step_months,
        "walk-forward started"
    );

    let outcomes = windows
        .par_iter()
        .map(|spec| run_window(bars, spec, config, optimizer, engine))
        .collect::<Result<Vec<_>, _>>()?;

    let mut completed = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            WindowOutcome::Completed(result) => completed.push(result),
            WindowOutcome::Skipped(skip) => skipped.push(skip),
        }
    }

    let skipped_count = skipped.len();
    let report = WalkForwardReport::from_windows(optimizer.name(), completed, skipped).ok_or(
        WalkForwardError::NoSuccessfulWindows {
            skipped: skipped_count,
        },
    )?;
    tracing::info!(
        completed = report.total_windows,
        skipped = skipped_count,
        consistency_pct = report.consistency_pct,
        avg_oos_pnl_pct = report.avg_oos_pnl_pct,
        "walk-forward finished"
    );
    Ok(report)
}

fn run_window(
    bars: &[Bar],
    spec: &WindowSpec,
    config: &WalkForwardConfig,
    optimizer: &dyn Optimizer,
    engine: &EngineConfig,
) -> Result<WindowOutcome, WalkForwardError> {
    let skip = |reason: SkipReason| -> Result<WindowOutcome, WalkForwardError> {
        tracing::debug!(window = spec.index, reason = ?reason, "window skipped");
        Ok(WindowOutcome::Skipped(SkippedWindow { spec: *spec, reason }))
    };

    let train = slice_between(bars, spec.train_start, spec.train_end);
    if train.len() < config.min_train_bars {
        return skip(SkipReason::TooFewTrainingBars {
            bars: train.len(),
            required: config.min_train_bars,
        });
    }

    let params = optimizer
        .optimize(train, engine)
        .map_err(|source| WalkForwardError::Optimization {
            window: spec.index,
            source,
        })?;
    let Some(params) = params else {
        return skip(SkipReason::NoViableParams);
    };

    let test = test_slice(bars, spec);
    if test.len() < config.min_test_bars {
        return skip(SkipReason::TooFewTestBars {
            bars: test.len(),
            required: config.min_test_bars,
        });
    }

    let signal = ScoreSignal::from_config(&params.signal);
    let filter = EntryFilter::new(params.signal);
    let oos = run_backtest(test, &params.risk, &signal, &filter, engine).map_err(|source| {
        WalkForwardError::Simulation {
            window: spec.index,
            source,
        }
    })?;
    tracing::debug!(
        window = spec.index,
        oos_pnl_pct = oos.total_pnl_pct,
        oos_trades = oos.trades_count,
        "window tested"
    );

    Ok(WindowOutcome::Completed(WindowResult {
        spec: *spec,
        fingerprint: window_fingerprint(train, test, &params),
        params,
        train_bars: train.len(),
        test_bars: test.len(),
        oos_pnl_pct: oos.total_pnl_pct,
        oos_trades: oos.trades_count,
        oos_win_rate: oos.win_rate,
        oos_max_drawdown_pct: oos.max_drawdown_pct,
    }))
}

fn window_fingerprint(train: &[Bar], test: &[Bar], params: &ParamSet) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(dataset_hash(train).as_bytes());
    hasher.update(dataset_hash(test).as_bytes());
    hasher.update(params.fingerprint().as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    /// Daily bars without signal scores: any parameters trade zero times.
    fn quiet_daily_bars(days: i64) -> Vec<Bar> {
        (0..days)
            .map(|i| Bar::new(day(i), 100.0, 101.0, 99.0, 100.0))
            .collect()
    }

    struct FixedOptimizer {
        params: Option<ParamSet>,
        calls: AtomicUsize,
    }

    impl FixedOptimizer {
        fn new(params: Option<ParamSet>) -> Self {
            Self {
                params,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Optimizer for FixedOptimizer {
        fn name(&self) -> &str {
            "fixed"
        }

        fn optimize(
            &self,
            _bars: &[Bar],
            _engine: &EngineConfig,
        ) -> Result<Option<ParamSet>, SimError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.params)
        }
    }

    fn window_result(pnl: f64, trades: usize, dd: f64) -> WindowResult {
        WindowResult {
            spec: WindowSpec {
                index: 0,
                train_start: day(0),
                train_end: day(180),
                test_start: day(180),
                test_end: day(240),
            },
            fingerprint: String::new(),
            params: ParamSet::default(),
            train_bars: 180,
            test_bars: 60,
            oos_pnl_pct: pnl,
            oos_trades: trades,
            oos_win_rate: 50.0,
            oos_max_drawdown_pct: dd,
        }
    }

    // ─── Window creation ─────────────────────────────────────────

    #[test]
    fn one_year_gives_three_default_windows() {
        let windows = create_windows(day(0), day(365), &WalkForwardConfig::default()).unwrap();
        // Starts at 0, 60, 120; the next would end on day 420.
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].train_end, day(180));
        assert_eq!(windows[0].test_end, day(240));
        assert_eq!(windows[2].train_start, day(120));
        assert_eq!(windows[2].test_end, day(360));
    }

    #[test]
    fn test_range_follows_training_range() {
        let windows = create_windows(day(0), day(800), &WalkForwardConfig::default()).unwrap();
        for w in &windows {
            assert_eq!(w.test_start, w.train_end);
            assert!(w.test_end <= day(800));
        }
        for pair in windows.windows(2) {
            assert_eq!(pair[1].train_start - pair[0].train_start, Duration::days(60));
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
    }

    #[test]
    fn window_may_end_exactly_on_range_end() {
        let windows = create_windows(day(0), day(240), &WalkForwardConfig::default()).unwrap();
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn short_range_has_no_windows() {
        let err = create_windows(day(0), day(239), &WalkForwardConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            WalkForwardError::NoWindows {
                span_days: 239,
                window_days: 240
            }
        ));
    }

    #[test]
    fn reversed_range_rejected() {
        assert!(matches!(
            create_windows(day(10), day(0), &WalkForwardConfig::default()),
            Err(WalkForwardError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn zero_step_rejected() {
        let config = WalkForwardConfig {
            step_months: 0,
            ..Default::default()
        };
        assert!(matches!(
            create_windows(day(0), day(400), &config),
            Err(WalkForwardError::ZeroPeriod("step_months"))
        ));
    }

    #[test]
    fn slice_is_half_open() {
        let bars = quiet_daily_bars(10);
        let slice = slice_between(&bars, day(2), day(5));
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].timestamp, day(2));
        assert!(slice_between(&bars, day(20), day(30)).is_empty());
        assert!(slice_between(&bars, day(5), day(2)).is_empty());
    }

    // ─── Aggregation ─────────────────────────────────────────────

    #[test]
    fn final_bar_lands_in_the_last_test_window() {
        // Days 0..=60: one 30/30 window ending exactly on the last bar.
        let bars = quiet_daily_bars(61);
        let config = WalkForwardConfig {
            training_months: 1,
            testing_months: 1,
            step_months: 1,
            ..WalkForwardConfig::default()
        };
        let windows = create_windows(day(0), day(60), &config).unwrap();
        assert_eq!(windows.len(), 1);

        let test = test_slice(&bars, &windows[0]);
        assert_eq!(test.len(), 31);
        assert_eq!(test.last().map(|b| b.timestamp), Some(day(60)));
        let train = slice_between(&bars, windows[0].train_start, windows[0].train_end);
        assert_eq!(train.len(), 30);
    }

    #[test]
    fn test_slice_stays_half_open_before_the_final_bar() {
        let bars = quiet_daily_bars(100);
        let spec = WindowSpec {
            index: 0,
            train_start: day(0),
            train_end: day(30),
            test_start: day(30),
            test_end: day(60),
        };
        assert_eq!(test_slice(&bars, &spec).len(), 30);
    }

    #[test]
    fn report_aggregates_completed_windows() {
        let report = WalkForwardReport::from_windows(
            "fixed",
            vec![
                window_result(5.0, 12, 8.0),
                window_result(-2.0, 10, 15.0),
                window_result(3.0, 11, 4.0),
            ],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(report.total_windows, 3);
        assert_eq!(report.profitable_windows, 2);
        assert!((report.consistency_pct - 200.0 / 3.0).abs() < 1e-9);
        assert!((report.avg_oos_pnl_pct - 2.0).abs() < 1e-12);
        assert!((report.avg_oos_trades - 11.0).abs() < 1e-12);
        assert_eq!(report.max_oos_drawdown_pct, 15.0);
    }

    #[test]
    fn flat_window_is_not_profitable() {
        let report =
            WalkForwardReport::from_windows("fixed", vec![window_result(0.0, 0, 0.0)], Vec::new())
                .unwrap();
        assert_eq!(report.profitable_windows, 0);
        assert_eq!(report.consistency_pct, 0.0);
    }

    #[test]
    fn empty_report_is_none() {
        assert!(WalkForwardReport::from_windows("fixed", Vec::new(), Vec::new()).is_none());
    }

    // ─── Orchestration ───────────────────────────────────────────

    #[test]
    fn quiet_data_completes_every_window_without_trades() {
        let bars = quiet_daily_bars(366);
        let optimizer = FixedOptimizer::new(Some(ParamSet::default()));
        let report = run_walk_forward(
            &bars,
            &WalkForwardConfig::default(),
            &optimizer,
            &EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(report.total_windows, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.avg_oos_trades, 0.0);
        assert_eq!(report.avg_oos_pnl_pct, 0.0);
        for w in &report.windows {
            assert_eq!(w.train_bars, 180);
            assert_eq!(w.test_bars, 60);
            assert_eq!(w.fingerprint.len(), 64);
        }
        let indices: Vec<usize> = report.windows.iter().map(|w| w.spec.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn optimizer_without_survivors_skips_all_windows() {
        let bars = quiet_daily_bars(366);
        let optimizer = FixedOptimizer::new(None);
        let err = run_walk_forward(
            &bars,
            &WalkForwardConfig::default(),
            &optimizer,
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WalkForwardError::NoSuccessfulWindows { skipped: 3 }));
    }

    #[test]
    fn short_training_slices_skip_before_optimizing() {
        let bars = quiet_daily_bars(366);
        let optimizer = FixedOptimizer::new(Some(ParamSet::default()));
        let config = WalkForwardConfig {
            min_train_bars: 181,
            ..Default::default()
        };
        let err = run_walk_forward(&bars, &config, &optimizer, &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, WalkForwardError::NoSuccessfulWindows { skipped: 3 }));
        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unordered_bars_rejected() {
        let mut bars = quiet_daily_bars(300);
        bars.swap(10, 11);
        let optimizer = FixedOptimizer::new(Some(ParamSet::default()));
        let err = run_walk_forward(
            &bars,
            &WalkForwardConfig::default(),
            &optimizer,
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WalkForwardError::UnorderedBars { index: 11 }));
    }
}
