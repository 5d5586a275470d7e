use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::trading::trade_record::{CompletedTrade, EquityPoint, LegRole};

use super::runner::{BacktestResult, RunCounters};

/// Summary statistics over a trade list and equity curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent, 0 when there are no trades.
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// Exactly 0 when there is no gross loss.
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
}

impl PerformanceMetrics {
    pub fn compute(trades: &[CompletedTrade], equity: &[EquityPoint], annualization_factor: f64) -> Self {
        let total_trades = trades.len();
        let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| !t.is_win()).map(|t| t.pnl).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().filter(|p| **p < 0.0).sum::<f64>().abs();

        let win_rate = if total_trades > 0 {
            wins.len() as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = compute_drawdown(equity);

        PerformanceMetrics {
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            gross_profit,
            gross_loss,
            profit_factor,
            avg_win: mean(&wins),
            avg_loss: mean(&losses),
            best_trade: trades.iter().map(|t| t.pnl).reduce(f64::max).unwrap_or(0.0),
            worst_trade: trades.iter().map(|t| t.pnl).reduce(f64::min).unwrap_or(0.0),
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio: compute_sharpe(equity, annualization_factor),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegStats {
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub strategy: String,

    // Period
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub days: f64,

    // Performance
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub avg_hold_minutes: f64,

    pub metrics: PerformanceMetrics,
    pub counters: RunCounters,

    // By leg
    pub leg_stats: BTreeMap<String, LegStats>,
}

impl BacktestReport {
    pub fn from_result(result: &BacktestResult, annualization_factor: f64) -> Self {
        let initial = result.initial_balance;
        let total_pnl = result.final_balance - initial;
        let days = match (result.start, result.end) {
            (Some(s), Some(e)) => (e - s).num_minutes() as f64 / 1440.0,
            _ => 0.0,
        };

        let mut leg_stats: BTreeMap<String, LegStats> = BTreeMap::new();
        for role in [LegRole::Quick, LegRole::Main] {
            let legs: Vec<&CompletedTrade> = result.trades.iter().filter(|t| t.role == role).collect();
            let wins = legs.iter().filter(|t| t.is_win()).count();
            leg_stats.insert(
                role.to_string(),
                LegStats {
                    trades: legs.len(),
                    wins,
                    win_rate: if legs.is_empty() {
                        0.0
                    } else {
                        wins as f64 / legs.len() as f64 * 100.0
                    },
                    total_pnl: legs.iter().map(|t| t.pnl).sum(),
                },
            );
        }

        BacktestReport {
            symbol: result.symbol.clone(),
            strategy: result.strategy.clone(),
            start: result.start,
            end: result.end,
            days,
            initial_balance: initial,
            final_balance: result.final_balance,
            total_pnl,
            total_return_pct: if initial > 0.0 {
                total_pnl / initial * 100.0
            } else {
                0.0
            },
            avg_hold_minutes: if result.trades.is_empty() {
                0.0
            } else {
                result
                    .trades
                    .iter()
                    .map(|t| t.hold_duration_seconds() as f64 / 60.0)
                    .sum::<f64>()
                    / result.trades.len() as f64
            },
            metrics: PerformanceMetrics::compute(&result.trades, &result.equity, annualization_factor),
            counters: result.counters.clone(),
            leg_stats,
        }
    }

    /// Plain-text rendering shared by the console summary and the report file.
    pub fn render(&self) -> String {
        let m = &self.metrics;
        let c = &self.counters;
        let rule = "  ───────────────────────────────────";
        let fmt_ts = |ts: Option<DateTime<Utc>>| {
            ts.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
        };

        let mut out = String::new();
        let _ = writeln!(out, "\n{}", "=".repeat(70));
        let _ = writeln!(out, "  BACKTEST REPORT  {} [{}]", self.symbol, self.strategy);
        let _ = writeln!(out, "{}", "=".repeat(70));
        let _ = writeln!(
            out,
            "  Period:      {} to {} ({:.1} days)",
            fmt_ts(self.start),
            fmt_ts(self.end),
            self.days
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "  PERFORMANCE");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  Initial:     ${:.2}", self.initial_balance);
        let _ = writeln!(out, "  Final:       ${:.2}", self.final_balance);
        let _ = writeln!(out, "  PnL:         ${:+.2}", self.total_pnl);
        let _ = writeln!(out, "  Return:      {:+.2}%", self.total_return_pct);
        let _ = writeln!(out);
        let _ = writeln!(out, "  TRADES (per leg)");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  Total:       {}", m.total_trades);
        let _ = writeln!(out, "  Win/Loss:    {} / {}", m.winning_trades, m.losing_trades);
        let _ = writeln!(out, "  Win Rate:    {:.1}%", m.win_rate);
        let _ = writeln!(out, "  Avg Win:     ${:+.2}", m.avg_win);
        let _ = writeln!(out, "  Avg Loss:    ${:+.2}", m.avg_loss);
        let _ = writeln!(out, "  Best:        ${:+.2}", m.best_trade);
        let _ = writeln!(out, "  Worst:       ${:+.2}", m.worst_trade);
        let _ = writeln!(out, "  Profit Factor: {:.2}", m.profit_factor);
        let _ = writeln!(out, "  Avg Hold:    {:.1} min", self.avg_hold_minutes);
        let _ = writeln!(out);
        let _ = writeln!(out, "  RISK");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  Max DD:      ${:.2} ({:.2}%)", m.max_drawdown, m.max_drawdown_pct);
        let _ = writeln!(out, "  Sharpe:      {:.2}", m.sharpe_ratio);
        let _ = writeln!(out);
        let _ = writeln!(out, "  SIGNALS");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  Bars:        {}", c.bars);
        let _ = writeln!(out, "  Skipped:     {}", c.bars_skipped);
        let _ = writeln!(out, "  Generated:   {}", c.signals);
        let _ = writeln!(out, "  Opened:      {}", c.positions_opened);
        let _ = writeln!(out, "  Rejected:    {}", c.orders_rejected);
        let _ = writeln!(out, "  Degenerate:  {}", c.degenerate_selections);
        let _ = writeln!(out, "  Min volume:  {}", c.degraded_sizing);

        if self.leg_stats.values().any(|s| s.trades > 0) {
            let _ = writeln!(out);
            let _ = writeln!(out, "  BY LEG");
            let _ = writeln!(out, "{rule}");
            for (leg, stats) in &self.leg_stats {
                let _ = writeln!(
                    out,
                    "  {:>6}: {} trades | WR {:.0}% | PnL ${:+.2}",
                    leg, stats.trades, stats.win_rate, stats.total_pnl
                );
            }
        }

        let _ = writeln!(out, "{}", "=".repeat(70));
        out
    }

    pub fn print_summary(&self) {
        print!("{}", self.render());
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Largest peak-to-trough equity drop, absolute and as a percent of the peak.
fn compute_drawdown(equity: &[EquityPoint]) -> (f64, f64) {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0f64;
    let mut max_dd_pct = 0.0f64;
    for point in equity {
        peak = peak.max(point.equity);
        let dd = peak - point.equity;
        max_dd = max_dd.max(dd);
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max(dd / peak * 100.0);
        }
    }
    (max_dd, max_dd_pct)
}

fn compute_sharpe(equity: &[EquityPoint], annualization_factor: f64) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0].equity != 0.0)
        .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
        .collect();
    if returns.is_empty() {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev == 0.0 || !std_dev.is_finite() {
        return 0.0;
    }

    mean / std_dev * annualization_factor.max(0.0).sqrt()
}
