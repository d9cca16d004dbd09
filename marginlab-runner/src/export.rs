//! Result export — JSON manifests and CSV tapes.
//!
//! - **JSON**: any serializable result (portfolio run, walk-forward report)
//! - **CSV**: trade tape and marked equity curve for external tools

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use marginlab_core::domain::TradeRecord;
use marginlab_core::engine::{EquityPoint, PortfolioResult};
use serde::Serialize;

use crate::walk_forward::WalkForwardReport;

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize result to JSON")
}

pub fn import_portfolio_json(json: &str) -> Result<PortfolioResult> {
    serde_json::from_str(json).context("failed to deserialize PortfolioResult from JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: key, symbol, side, entry_time, entry_price, exit_time,
/// exit_price, exit_reason, notional, fees, realized_pnl
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "key",
        "symbol",
        "side",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "exit_reason",
        "notional",
        "fees",
        "realized_pnl",
    ])?;

    for t in trades {
        wtr.write_record(&[
            t.key.to_string(),
            t.symbol.clone(),
            t.side.to_string(),
            t.entry_time.to_rfc3339(),
            format!("{:.6}", t.entry_price),
            t.timestamp.to_rfc3339(),
            format!("{:.6}", t.exit_price),
            t.exit_reason.to_string(),
            format!("{:.2}", t.notional),
            format!("{:.4}", t.fees),
            format!("{:.4}", t.realized_pnl),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: timestamp, equity, peak, drawdown_pct
pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity", "peak", "drawdown_pct"])?;
    for p in curve {
        wtr.write_record(&[
            p.timestamp.to_rfc3339(),
            format!("{:.4}", p.equity),
            format!("{:.4}", p.peak),
            format!("{:.4}", p.drawdown_pct),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `manifest.json`, `trades.csv` and `equity.csv` for a portfolio run
/// into `output_dir/run_name/`. Returns the created directory.
pub fn save_portfolio_artifacts(
    result: &PortfolioResult,
    output_dir: &Path,
    run_name: &str,
) -> Result<PathBuf> {
    let run_dir = output_dir.join(run_name);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write(&run_dir.join("manifest.json"), &export_json(result)?)?;
    write(&run_dir.join("trades.csv"), &export_trades_csv(&result.trades)?)?;
    write(&run_dir.join("equity.csv"), &export_equity_csv(&result.equity_curve)?)?;

    tracing::info!(dir = %run_dir.display(), trades = result.trades_count, "artifacts saved");
    Ok(run_dir)
}

pub fn load_portfolio_manifest(dir: &Path) -> Result<PortfolioResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_portfolio_json(&json)
}

/// Write a walk-forward report as `wf_<name>.json` under `output_dir`.
pub fn save_walk_forward_report(
    report: &WalkForwardReport,
    output_dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let path = output_dir.join(format!("wf_{}.json", safe_file_stem(name)));
    write(&path, &export_json(report)?)?;
    Ok(path)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Keep ASCII alphanumerics, `-` and `_`; drop everything else.
fn safe_file_stem(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use marginlab_core::domain::{ExitReason, Side, StrategyKey};
    use std::collections::BTreeMap;

    fn sample_trade() -> TradeRecord {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        TradeRecord {
            key: StrategyKey::new("BTC_4h"),
            symbol: "BTC/USDT".into(),
            side: Side::Long,
            entry_time: t0,
            entry_price: 100.0,
            timestamp: t0 + Duration::hours(4),
            exit_price: 96.0,
            exit_reason: ExitReason::StopLoss,
            notional: 250.0,
            fees: 0.3,
            realized_pnl: -10.3,
        }
    }

    fn sample_result() -> PortfolioResult {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let key = StrategyKey::new("BTC_4h");
        PortfolioResult {
            start_capital: 1000.0,
            end_capital: 989.7,
            total_pnl_pct: -1.03,
            trades_count: 1,
            win_rate: 0.0,
            max_drawdown_pct: 1.03,
            max_drawdown_date: Some(t0 + Duration::hours(4)),
            min_equity: 989.7,
            liquidation_date: None,
            stopped_early: false,
            equity_curve: vec![
                EquityPoint {
                    timestamp: t0,
                    equity: 1000.0,
                    peak: 1000.0,
                    drawdown_pct: 0.0,
                },
                EquityPoint {
                    timestamp: t0 + Duration::hours(4),
                    equity: 989.7,
                    peak: 1000.0,
                    drawdown_pct: 1.03,
                },
            ],
            pnl_per_strategy: BTreeMap::from([(key.clone(), -10.3)]),
            trades_per_strategy: BTreeMap::from([(key, 1)]),
            trades: vec![sample_trade()],
        }
    }

    #[test]
    fn csv_trades_header_and_row() {
        let csv = export_trades_csv(&[sample_trade()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "key,symbol,side,entry_time,entry_price,exit_time,exit_price,exit_reason,notional,fees,realized_pnl"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("BTC_4h,BTC/USDT,"));
        assert!(row.contains(",stop_loss,"));
        assert!(row.ends_with("-10.3000"));
    }

    #[test]
    fn csv_empty_trades_is_header_only() {
        let csv = export_trades_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn csv_equity_rows_match_curve() {
        let result = sample_result();
        let csv = export_equity_csv(&result.equity_curve).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().nth(2).unwrap().contains("989.7000"));
    }

    #[test]
    fn save_load_artifacts_roundtrip() {
        let result = sample_result();
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_portfolio_artifacts(&result, dir.path(), "run_abc").unwrap();

        assert!(run_dir.join("manifest.json").exists());
        assert!(run_dir.join("trades.csv").exists());
        assert!(run_dir.join("equity.csv").exists());

        let loaded = load_portfolio_manifest(&run_dir).unwrap();
        assert_eq!(loaded.trades_count, 1);
        assert_eq!(loaded.equity_curve, result.equity_curve);
        assert_eq!(loaded.pnl_per_strategy, result.pnl_per_strategy);
    }

    #[test]
    fn load_missing_manifest_fails_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_portfolio_manifest(dir.path()).unwrap_err();
        assert!(err.to_string().contains("manifest.json"));
    }

    #[test]
    fn file_stem_strips_path_characters() {
        assert_eq!(safe_file_stem("BTC/USDT:USDT_4h"), "BTCUSDTUSDT_4h");
    }
}
