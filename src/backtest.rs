//! Mean-reversion backtest engine.
//!
//! A threshold-driven state machine walks the z-score series in time order,
//! opening a spread position when the z-score breaches the entry threshold
//! and closing it on reversion through the exit threshold. The engine is
//! synchronous, reads its inputs immutably and keeps no state between calls;
//! repeated runs over identical inputs produce identical reports.

use crate::config::EngineConfig;
use crate::error::{PairError, Result};
use crate::types::{
    Direction, PositionState, SeriesPoint, SpreadSeries, TradeRecord, ZScoreSeries,
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Position state at one timestamp of the input index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionPoint {
    pub timestamp: DateTime<Utc>,
    pub state: PositionState,
}

/// Terminal output of a backtest run; read-only to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Closed trades in entry order.
    pub trades: Vec<TradeRecord>,
    /// Sum of all trade P&L, including any forced close.
    pub total_pnl: f64,
    /// P&L of signal-driven closes only.
    pub realized_pnl: f64,
    /// P&L of the end-of-series mark-to-market close, if any.
    pub forced_pnl: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction of closed trades with positive P&L, in [0, 1].
    pub win_rate: f64,
    pub forced_closes: usize,
    /// Position state per input timestamp, for charting.
    pub positions: Vec<PositionPoint>,
    /// Cumulative P&L per input timestamp: realized plus the open
    /// position's mark-to-market against the last defined spread.
    pub equity_curve: Vec<SeriesPoint>,
}

/// Simulate the mean-reversion strategy over a spread and its z-score.
///
/// The two series must share the same timestamp index. Undefined z-scores
/// are treated as "no signal". A position still open at the end of the
/// series is force-closed at the last defined spread value and flagged.
pub fn run_backtest(
    spread: &SpreadSeries,
    zscore: &ZScoreSeries,
    config: &EngineConfig,
) -> Result<BacktestReport> {
    config.validate()?;
    check_alignment(spread, zscore)?;

    info!(
        "Running mean-reversion backtest: {} points, entry={} exit={}",
        zscore.len(),
        config.entry_threshold,
        config.exit_threshold
    );

    let mut state = PositionState::Flat;
    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut open_trade: Option<TradeRecord> = None;
    let mut positions = Vec::with_capacity(zscore.len());
    let mut equity_curve = Vec::with_capacity(zscore.len());
    let mut realized_cum = 0.0;
    let mut last_spread_at: Option<(usize, f64)> = None;

    for i in 0..zscore.len() {
        let ts = zscore[i].timestamp;
        if let Some(s) = spread[i].value {
            last_spread_at = Some((i, s));
        }

        if let Some(z) = zscore[i].value {
            match state {
                PositionState::Flat => {
                    let direction = if z <= -config.entry_threshold {
                        Some(Direction::Long)
                    } else if z >= config.entry_threshold {
                        Some(Direction::Short)
                    } else {
                        None
                    };
                    if let Some(direction) = direction {
                        match spread[i].value {
                            Some(entry_spread) => {
                                debug!(
                                    "{} entry at {} (z={:.3}, spread={:.4})",
                                    direction, ts, z, entry_spread
                                );
                                open_trade =
                                    Some(TradeRecord::open(direction, ts, z, entry_spread));
                                state = match direction {
                                    Direction::Long => PositionState::LongSpread,
                                    Direction::Short => PositionState::ShortSpread,
                                };
                            }
                            None => {
                                debug!(
                                    "entry signal at {} skipped: spread undefined",
                                    ts
                                );
                            }
                        }
                    }
                }
                PositionState::LongSpread if z >= config.exit_threshold => {
                    if let Some(exit_spread) = spread[i].value {
                        if let Some(mut trade) = open_trade.take() {
                            trade.close(ts, Some(z), exit_spread, config.position_size, false);
                            realized_cum += trade.pnl.unwrap_or(0.0);
                            trades.push(trade);
                            state = PositionState::Flat;
                        }
                    }
                }
                PositionState::ShortSpread if z <= config.exit_threshold => {
                    if let Some(exit_spread) = spread[i].value {
                        if let Some(mut trade) = open_trade.take() {
                            trade.close(ts, Some(z), exit_spread, config.position_size, false);
                            realized_cum += trade.pnl.unwrap_or(0.0);
                            trades.push(trade);
                            state = PositionState::Flat;
                        }
                    }
                }
                _ => {}
            }
        }

        positions.push(PositionPoint {
            timestamp: ts,
            state,
        });

        let unrealized = match (&open_trade, last_spread_at.map(|(_, s)| s)) {
            (Some(trade), Some(mark)) => {
                let signed = match trade.direction {
                    Direction::Long => -1.0,
                    Direction::Short => 1.0,
                };
                signed * (mark - trade.entry_spread) * config.position_size
            }
            _ => 0.0,
        };
        equity_curve.push(SeriesPoint::new(ts, Some(realized_cum + unrealized)));
    }

    // Force-close anything still open at the end of the series.
    let mut forced_pnl = 0.0;
    let mut forced_closes = 0;
    if let Some(mut trade) = open_trade.take() {
        // Entry required a defined spread, so one always exists.
        if let Some((idx, exit_spread)) = last_spread_at {
            warn!(
                "Force-closing open {} position at end of series (spread={:.4})",
                trade.direction, exit_spread
            );
            trade.close(
                zscore[idx].timestamp,
                zscore[idx].value,
                exit_spread,
                config.position_size,
                true,
            );
            forced_pnl = trade.pnl.unwrap_or(0.0);
            forced_closes = 1;
            trades.push(trade);
            if let Some(last) = equity_curve.last_mut() {
                last.value = Some(realized_cum + forced_pnl);
            }
        }
    }

    let winning_trades = trades.iter().filter(|t| t.is_win()).count();
    let losing_trades = trades
        .iter()
        .filter(|t| t.pnl.map(|p| p < 0.0).unwrap_or(false))
        .count();
    let total_trades = trades.len();
    let win_rate = if total_trades > 0 {
        winning_trades as f64 / total_trades as f64
    } else {
        0.0
    };

    Ok(BacktestReport {
        total_pnl: realized_cum + forced_pnl,
        realized_pnl: realized_cum,
        forced_pnl,
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        forced_closes,
        trades,
        positions,
        equity_curve,
    })
}

fn check_alignment(spread: &[SeriesPoint], zscore: &[SeriesPoint]) -> Result<()> {
    if spread.len() != zscore.len() {
        return Err(PairError::Alignment(format!(
            "spread has {} points but z-score has {}",
            spread.len(),
            zscore.len()
        )));
    }
    for (i, (s, z)) in spread.iter().zip(zscore.iter()).enumerate() {
        if s.timestamp != z.timestamp {
            return Err(PairError::Alignment(format!(
                "spread/z-score timestamp mismatch at index {}: {} vs {}",
                i, s.timestamp, z.timestamp
            )));
        }
    }
    Ok(())
}

/// Backtest several independent pairs in parallel.
///
/// Each pair is evaluated with the same configuration; inputs are read-only,
/// so pairs parallelize freely.
pub fn run_many(
    pairs: &[(&SpreadSeries, &ZScoreSeries)],
    config: &EngineConfig,
) -> Vec<Result<BacktestReport>> {
    pairs
        .par_iter()
        .map(|&(spread, zscore)| run_backtest(spread, zscore, config))
        .collect()
}

/// Annualized Sharpe ratio of the per-period equity changes.
pub fn sharpe_ratio(equity_curve: &[SeriesPoint]) -> f64 {
    let changes: Vec<f64> = equity_curve
        .windows(2)
        .filter_map(|w| Some(w[1].value? - w[0].value?))
        .collect();
    if changes.len() < 2 {
        return 0.0;
    }
    let n = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / n;
    let var = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
    if var <= 0.0 {
        return 0.0;
    }
    mean / var.sqrt() * 252.0_f64.sqrt()
}
