mod common;

use chrono::{DateTime, Utc};

use trend_cluster_bot::backtesting::store::{self, RunArtifacts};
use trend_cluster_bot::backtesting::{BacktestReport, BacktestSimulator, PerformanceMetrics};
use trend_cluster_bot::config::{ClusterChoice, Config};
use trend_cluster_bot::core::factor_selector::FactorSelector;
use trend_cluster_bot::exchange::{collect_bars, HistoricalSource};
use trend_cluster_bot::models::{CandleSeries, Direction};
use trend_cluster_bot::strategies::{AdaptiveTrendStrategy, StrategyFactory};
use trend_cluster_bot::trading::{
    CloseReason, DualOrderTradeManager, EntryPlan, LegRole, PositionState, SimulatedExecution, TradeEvent,
    TradeManagerSettings,
};

use common::{bar, breakout_series, make_candles, swing_series, test_config, RecordingSink};

fn manager(sink: RecordingSink) -> DualOrderTradeManager {
    DualOrderTradeManager::new(
        TradeManagerSettings {
            move_sl_to_breakeven: true,
            point_value: 1.0,
        },
        Box::new(SimulatedExecution::new()),
        Box::new(sink),
    )
}

fn long_entry() -> EntryPlan {
    EntryPlan {
        direction: Direction::Buy,
        entry: 100.0,
        stop: 95.0,
        quick_tp: 105.0,
        main_tp: 115.0,
        volume: 2.0,
        opened_at: bar(0, 100.0, 100.5, 99.5, 100.0).timestamp,
    }
}

fn run(cfg: &Config, bars: &CandleSeries) -> trend_cluster_bot::backtesting::BacktestResult {
    BacktestSimulator::with_sinks(
        cfg,
        &StrategyFactory::with_defaults(),
        Box::new(SimulatedExecution::new()),
        Box::new(RecordingSink::default()),
    )
    .unwrap()
    .run(bars)
}

#[test]
fn volume_breakout_produces_single_buy() {
    let cfg = test_config();
    let bars = breakout_series(60, 40);
    let mut strat = AdaptiveTrendStrategy::new(&cfg).unwrap();
    let mut history = CandleSeries::default();
    let mut signals = Vec::new();

    for (i, c) in bars.iter().enumerate() {
        history.push(c.clone());
        strat.update(c);
        if let Ok(Some(sig)) = strat.evaluate(&history) {
            signals.push((i, sig));
        }
    }

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].0, 40);
    assert_eq!(signals[0].1.direction, Direction::Buy);
    assert!((signals[0].1.price - bars[40].close).abs() < 1e-9);
}

#[test]
fn quick_target_moves_main_to_breakeven_then_main_target() {
    let sink = RecordingSink::default();
    let mut tm = manager(sink.clone());
    tm.open(&long_entry()).unwrap();

    let quick = tm.on_bar(&bar(1, 101.0, 106.0, 100.5, 104.0));
    assert_eq!(quick.len(), 1);
    assert_eq!(quick[0].role, LegRole::Quick);
    assert!((quick[0].exit_price - 105.0).abs() < 1e-9);
    assert!(matches!(tm.state(), PositionState::QuickClosed(p) if p.stop_loss == 100.0));

    let main = tm.on_bar(&bar(2, 104.0, 115.5, 103.0, 115.0));
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].role, LegRole::Main);
    assert_eq!(main[0].reason, CloseReason::TakeProfit);
    assert!((main[0].exit_price - 115.0).abs() < 1e-9);
    assert_eq!(tm.state(), &PositionState::Closed);

    let breakevens = sink
        .events()
        .iter()
        .filter(|e| matches!(e, TradeEvent::BreakevenApplied { .. }))
        .count();
    assert_eq!(breakevens, 1);
}

#[test]
fn gap_through_stop_closes_both_legs_at_stop() {
    let mut tm = manager(RecordingSink::default());
    tm.open(&long_entry()).unwrap();

    let closed = tm.on_bar(&bar(1, 96.0, 97.0, 94.0, 94.5));
    assert_eq!(closed.len(), 2);
    for t in &closed {
        assert_eq!(t.reason, CloseReason::StopLoss);
        assert!((t.exit_price - 95.0).abs() < 1e-9);
        assert!(t.pnl < 0.0);
    }
    assert_eq!(tm.state(), &PositionState::Closed);
}

#[test]
fn zero_bars_yield_initial_equity_only() {
    let cfg = test_config();
    let result = run(&cfg, &CandleSeries::default());
    assert!(result.trades.is_empty());
    assert_eq!(result.equity.len(), 1);
    assert_eq!(result.equity[0].timestamp, DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(result.equity[0].equity, cfg.initial_balance);

    let m = PerformanceMetrics::compute(&result.trades, &result.equity, cfg.annualization_factor);
    assert_eq!(m.total_trades, 0);
    assert_eq!(m.profit_factor, 0.0);
    assert_eq!(m.sharpe_ratio, 0.0);
    assert_eq!(m.max_drawdown_pct, 0.0);
}

#[test]
fn identical_inputs_give_identical_runs() {
    let cfg = test_config();
    let bars = swing_series(400);
    let a = run(&cfg, &bars);
    let b = run(&cfg, &bars);
    assert_eq!(
        serde_json::to_string(&a.trades).unwrap(),
        serde_json::to_string(&b.trades).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&a.equity).unwrap(),
        serde_json::to_string(&b.equity).unwrap()
    );
    assert_eq!(a.counters, b.counters);
}

#[test]
fn swing_run_keeps_ledger_consistent() {
    let cfg = test_config();
    let bars = swing_series(400);
    let result = run(&cfg, &bars);

    let realized: f64 = result.trades.iter().map(|t| t.pnl).sum();
    assert!((result.final_balance - cfg.initial_balance - realized).abs() < 1e-6);

    // Every position contributes exactly one quick and one main leg.
    let quick = result.trades.iter().filter(|t| t.role == LegRole::Quick).count();
    let main = result.trades.iter().filter(|t| t.role == LegRole::Main).count();
    assert_eq!(quick, main);
    assert_eq!(quick, result.counters.positions_opened);

    for t in &result.trades {
        assert!(t.exit_time >= t.entry_time);
        assert_ne!(t.reason, CloseReason::Rollback);
    }

    let last = result.equity.last().unwrap();
    assert_eq!(last.timestamp, bars.last().unwrap().timestamp);
    assert!((last.equity - result.final_balance).abs() < 1e-9);
}

#[test]
fn selected_factor_stays_in_range() {
    let cfg = test_config();
    let bars = swing_series(300);
    for choice in [ClusterChoice::Worst, ClusterChoice::Average, ClusterChoice::Best] {
        let cfg = Config {
            cluster_choice: choice,
            ..cfg.clone()
        };
        let mut strat = AdaptiveTrendStrategy::new(&cfg).unwrap();
        let mut history = CandleSeries::default();
        for c in bars.iter() {
            history.push(c.clone());
            strat.update(c);
            let _ = strat.evaluate(&history);
            if let Some(sel) = strat.last_selection() {
                assert!(sel.factor >= cfg.min_factor && sel.factor <= cfg.max_factor);
            }
        }
        assert!(strat.last_selection().is_some());
    }
}

#[test]
fn fractional_factor_sweep_stays_in_range() {
    let cfg = Config {
        min_factor: 0.1,
        max_factor: 0.3,
        factor_step: 0.1,
        ..test_config()
    };
    let bars = swing_series(200);
    let mut strat = AdaptiveTrendStrategy::new(&cfg).unwrap();
    assert_eq!(*strat.trend().factors().last().unwrap(), 0.3);

    let mut history = CandleSeries::default();
    for c in bars.iter() {
        history.push(c.clone());
        strat.update(c);
        let _ = strat.evaluate(&history);
        if let Some(sel) = strat.last_selection() {
            assert!(sel.factor >= 0.1 && sel.factor <= 0.3, "factor {} out of range", sel.factor);
        }
    }
}

#[test]
fn degenerate_scores_pick_first_maximum() {
    let selector = FactorSelector::new(ClusterChoice::Best);
    let sel = selector
        .select_scores(&[1.0, 2.0, 3.0, 4.0], &[0.2, 0.7, 0.7, 0.2])
        .unwrap();
    assert!(sel.degenerate);
    assert_eq!(sel.factor, 2.0);
}

#[test]
fn profit_factor_zero_without_losing_trades() {
    let mut tm = manager(RecordingSink::default());
    tm.open(&long_entry()).unwrap();
    let mut trades = tm.on_bar(&bar(1, 101.0, 106.0, 100.5, 104.0));
    trades.extend(tm.on_bar(&bar(2, 104.0, 116.0, 103.0, 115.0)));
    assert!(trades.iter().all(|t| t.pnl > 0.0));

    let m = PerformanceMetrics::compute(&trades, &[], 252.0);
    assert_eq!(m.profit_factor, 0.0);
    assert_eq!(m.win_rate, 100.0);
}

#[test]
fn saved_run_recomputes_same_metrics() {
    let cfg = test_config();
    let bars = swing_series(300);
    let result = run(&cfg, &bars);
    let original = BacktestReport::from_result(&result, cfg.annualization_factor);

    let artifacts = RunArtifacts::new(&cfg, result);
    let path = store::output_path(&cfg, &artifacts.result, "run", "json");
    artifacts.save(&path).unwrap();

    let loaded = RunArtifacts::load(&path).unwrap();
    assert_eq!(loaded.result.trades.len(), artifacts.result.trades.len());
    assert_eq!(loaded.result.equity.len(), artifacts.result.equity.len());

    let m = loaded.metrics();
    let o = &original.metrics;
    assert_eq!(m.total_trades, o.total_trades);
    assert_eq!(m.winning_trades, o.winning_trades);
    assert!((m.profit_factor - o.profit_factor).abs() < 1e-9);
    assert!((m.max_drawdown_pct - o.max_drawdown_pct).abs() < 1e-9);
    assert!((m.sharpe_ratio - o.sharpe_ratio).abs() < 1e-6);

    let report_path = store::output_path(&cfg, &loaded.result, "backtest", "txt");
    store::save_report_to_file(&loaded.report(), &report_path).unwrap();
    let text = std::fs::read_to_string(&report_path).unwrap();
    assert!(text.contains("BACKTEST REPORT"));

    let _ = std::fs::remove_dir_all(&cfg.output_dir);
}

#[tokio::test]
async fn file_source_feeds_simulator() {
    let cfg = Config {
        output_dir: std::env::temp_dir()
            .join(format!("trend_cluster_feed_{}", std::process::id()))
            .to_string_lossy()
            .to_string(),
        ..test_config()
    };
    let bars = breakout_series(60, 40);
    let path = std::path::Path::new(&cfg.output_dir).join("bars.json");
    store::save_candles(&path, &bars).unwrap();

    let source = HistoricalSource::from_file(&cfg.symbol, &path).await.unwrap();
    assert_eq!(source.len(), 60);
    let loaded = collect_bars(source).await.unwrap();
    assert_eq!(loaded.len(), bars.len());

    let result = run(&cfg, &loaded);
    assert_eq!(result.counters.signals, 1);
    assert_eq!(result.trades.len(), 2);

    let _ = std::fs::remove_dir_all(&cfg.output_dir);
}

#[test]
fn short_warmup_series_never_trades() {
    let cfg = test_config();
    let bars = make_candles(&[(100.0, 101.0, 99.0, 100.0); 15]);
    let result = run(&cfg, &bars);
    assert!(result.trades.is_empty());
    assert_eq!(result.counters.bars_skipped, 15);
}
