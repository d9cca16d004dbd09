//! Simulation driver — the chronological bar loop.
//!
//! For every timestamp of the merged timeline, each phase runs across all
//! keys (in registration order) before the next phase starts:
//!
//! 1. Fill pending orders at the bar open.
//! 2. Evaluate open positions through the stop engine.
//! 3. Generate signals on flat keys at the bar close.
//! 4. Mark the ledger to market; stop on liquidation or early stop.
//!
//! Keys without a bar at a timestamp skip phases 1–3; their open positions
//! are marked at the last seen close.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::config::{EngineConfig, RiskConfig};
use crate::domain::{Bar, PendingOrder, Position, Side, StrategyKey, StrategyState, TradeRecord};
use crate::error::SimError;
use crate::ledger::CapitalLedger;
use crate::signal::{SignalFilter, SignalSource};
use crate::sizer::{size_position, RejectReason, SizingOutcome, SizingRequest};
use crate::stops::{evaluate_bar, StopPlan};

use super::control::{BarProgress, EarlyStop, NeverStop};
use super::result::{EquityPoint, PortfolioResult, RunOutcome, SimulationResult};
use super::state::{Slot, SlotTable, Strategy};

/// Run one strategy against its own capital.
///
/// Fewer than `config.min_bars` bars yields the insufficient-data result
/// instead of an error.
pub fn run_backtest(
    bars: &[Bar],
    risk: &RiskConfig,
    signal: &dyn SignalSource,
    filter: &dyn SignalFilter,
    config: &EngineConfig,
) -> Result<SimulationResult, SimError> {
    run_backtest_with_control(bars, risk, signal, filter, config, &mut NeverStop)
}

/// [`run_backtest`] with a cooperative early-stop hook.
pub fn run_backtest_with_control(
    bars: &[Bar],
    risk: &RiskConfig,
    signal: &dyn SignalSource,
    filter: &dyn SignalFilter,
    config: &EngineConfig,
    control: &mut dyn EarlyStop,
) -> Result<SimulationResult, SimError> {
    config.validate()?;
    if bars.len() < config.min_bars {
        tracing::debug!(
            bars = bars.len(),
            min_bars = config.min_bars,
            "insufficient data, returning degenerate result"
        );
        return Ok(SimulationResult::insufficient_data(config.start_capital));
    }

    let key = StrategyKey::new("single");
    let strategy = Strategy {
        key: &key,
        symbol: "",
        bars,
        risk,
        signal,
        filter,
    };
    let run = simulate(&[strategy], config, control)?;
    Ok(SimulationResult::from_run(run))
}

/// Run several strategies against one shared capital pool.
pub fn run_portfolio(
    strategies: &[Strategy<'_>],
    config: &EngineConfig,
    control: &mut dyn EarlyStop,
) -> Result<PortfolioResult, SimError> {
    config.validate()?;
    let run = simulate(strategies, config, control)?;
    Ok(PortfolioResult::from_run(run))
}

fn simulate(
    strategies: &[Strategy<'_>],
    config: &EngineConfig,
    control: &mut dyn EarlyStop,
) -> Result<RunOutcome, SimError> {
    for strategy in strategies {
        strategy.validate()?;
    }
    let mut slots = SlotTable::new(strategies)?;

    let timeline: BTreeSet<DateTime<Utc>> = strategies
        .iter()
        .flat_map(|s| s.bars.iter().map(|b| b.timestamp))
        .collect();

    tracing::info!(
        strategies = strategies.len(),
        timestamps = timeline.len(),
        start_capital = config.start_capital,
        "simulation started"
    );

    let mut ledger = CapitalLedger::new(config.start_capital);
    let mut equity_curve = Vec::with_capacity(timeline.len());
    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut stopped_early = false;

    for (index, &timestamp) in timeline.iter().enumerate() {
        for slot in slots.iter_mut() {
            slot.advance_to(timestamp);
        }

        // ── Phase 1: fill pending orders at the open ──
        // Free equity is snapshotted once per timestamp so keys filled in
        // the same bar cannot spend the same margin twice.
        let mut free_equity = ledger.free_equity();
        let mut open_positions = slots.open_positions();
        for slot in slots.iter_mut() {
            if let Some(margin) = fill_pending(slot, &mut ledger, config, free_equity, open_positions) {
                free_equity -= margin;
                open_positions += 1;
            }
        }

        // ── Phase 2: stop engine ──
        for slot in slots.iter_mut() {
            if let Some(trade) = evaluate_position(slot, &mut ledger, config) {
                trades.push(trade);
            }
        }

        // ── Phase 3: signals at the close ──
        for slot in slots.iter_mut() {
            generate_signal(slot);
        }

        // ── Phase 4: ledger ──
        let marked = ledger.mark_to_market(slots.unrealized_pnl(), timestamp);
        equity_curve.push(EquityPoint {
            timestamp,
            equity: marked,
            peak: ledger.peak_equity(),
            drawdown_pct: ledger.drawdown_pct(),
        });

        if ledger.is_liquidated() {
            tracing::warn!(
                at = %timestamp,
                equity = ledger.equity(),
                marked,
                "ledger liquidated, remaining bars skipped"
            );
            break;
        }

        let progress = BarProgress {
            index,
            timestamp,
            marked_equity: marked,
            drawdown_pct: ledger.drawdown_pct(),
            trades_count: trades.len(),
        };
        if control.should_stop(&progress) {
            tracing::debug!(at = %timestamp, "early stop requested");
            stopped_early = true;
            break;
        }
    }

    tracing::info!(
        trades = trades.len(),
        equity = ledger.equity(),
        max_drawdown_pct = ledger.max_drawdown_pct(),
        liquidated = ledger.is_liquidated(),
        "simulation finished"
    );

    Ok(RunOutcome {
        keys: slots.keys(),
        ledger,
        equity_curve,
        trades,
        stopped_early,
    })
}

/// Phase 1 for one key. Returns the committed margin on a fill.
///
/// The pending order is consumed whatever the outcome.
fn fill_pending(
    slot: &mut Slot<'_>,
    ledger: &mut CapitalLedger,
    config: &EngineConfig,
    free_equity: f64,
    open_positions: usize,
) -> Option<f64> {
    let bar = slot.bar()?;
    let StrategyState::Pending(order) = slot.state else {
        return None;
    };
    slot.state = StrategyState::Flat;

    let strategy = slot.strategy;
    if config
        .max_concurrent_positions
        .is_some_and(|limit| open_positions >= limit)
    {
        tracing::debug!(key = %strategy.key, open_positions, "fill rejected: position limit");
        return None;
    }

    let entry_price = bar.open;
    let previous = slot.previous_bar();
    let structure_extreme = match order.side {
        Side::Long => bar.prev_low.or(previous.map(|b| b.low)),
        Side::Short => bar.prev_high.or(previous.map(|b| b.high)),
    };
    let plan = StopPlan::compute(
        order.side,
        entry_price,
        order.reference_volatility,
        structure_extreme,
        strategy.risk,
    );

    let request = SizingRequest {
        equity: ledger.equity(),
        free_equity,
        entry_price,
        stop_distance: plan.stop_distance,
    };
    let sized = match size_position(&request, strategy.risk, &config.exchange) {
        SizingOutcome::Accepted(sized) => sized,
        SizingOutcome::Rejected(reason) => {
            log_rejection(strategy.key, reason, &request);
            return None;
        }
    };

    let position = Position::open(
        order.side,
        entry_price,
        bar.timestamp,
        &plan,
        sized.notional,
        sized.margin,
        strategy.risk.callback_rate(),
    );
    tracing::debug!(
        key = %strategy.key,
        side = %order.side,
        entry_price,
        stop_loss = plan.stop_loss,
        take_profit = plan.take_profit,
        notional = sized.notional,
        margin = sized.margin,
        "position opened"
    );
    ledger.commit_margin(strategy.key, sized.margin);
    slot.state = StrategyState::Open(position);
    Some(sized.margin)
}

fn log_rejection(key: &StrategyKey, reason: RejectReason, request: &SizingRequest) {
    tracing::debug!(
        key = %key,
        reason = ?reason,
        equity = request.equity,
        free_equity = request.free_equity,
        stop_distance = request.stop_distance,
        "fill rejected"
    );
}

/// Phase 2 for one key. Returns the trade record on an exit.
fn evaluate_position(
    slot: &mut Slot<'_>,
    ledger: &mut CapitalLedger,
    config: &EngineConfig,
) -> Option<TradeRecord> {
    let bar = slot.bar()?;
    let StrategyState::Open(position) = &mut slot.state else {
        return None;
    };
    position.last_price = bar.close;

    let exit = evaluate_bar(position, bar)?;
    let gross = position.notional * position.price_return(exit.price);
    let fees = config.exchange.round_trip_fee(position.notional);
    let realized_pnl = gross - fees;

    let strategy = slot.strategy;
    let trade = TradeRecord {
        key: strategy.key.clone(),
        symbol: strategy.symbol.to_string(),
        side: position.side,
        entry_time: position.entry_time,
        entry_price: position.entry_price,
        timestamp: bar.timestamp,
        exit_price: exit.price,
        exit_reason: exit.reason,
        notional: position.notional,
        fees,
        realized_pnl,
    };
    tracing::debug!(
        key = %strategy.key,
        exit_price = exit.price,
        reason = ?exit.reason,
        realized_pnl,
        "position closed"
    );

    ledger.realize(realized_pnl);
    ledger.release_margin(strategy.key);
    slot.state = StrategyState::Flat;
    Some(trade)
}

/// Phase 3 for one key: flat keys may queue an order for their next bar.
fn generate_signal(slot: &mut Slot<'_>) {
    let Some(bar) = slot.bar() else {
        return;
    };
    if !slot.state.is_flat() {
        return;
    }
    let strategy = slot.strategy;
    let Some(reading) = strategy.signal.evaluate(bar, bar.htf_bias) else {
        return;
    };
    let verdict = strategy.filter.evaluate(&reading, bar);
    if !verdict.is_passed() {
        tracing::trace!(key = %strategy.key, verdict = ?verdict, "signal filtered");
        return;
    }
    slot.state = StrategyState::Pending(PendingOrder {
        side: reading.side,
        reference_volatility: reading.reference_volatility,
        signal_time: bar.timestamp,
    });
}
