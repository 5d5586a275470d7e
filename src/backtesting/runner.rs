use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::position_sizer::{PositionSizer, SymbolListClassifier};
use crate::error::{ConfigError, ExecutionError, SignalError};
use crate::models::{Candle, CandleSeries};
use crate::strategies::{SignalStrategy, StrategyFactory};
use crate::trading::events::{EventSink, LogEventSink};
use crate::trading::execution::{ExecutionSink, SimulatedExecution};
use crate::trading::trade_manager::{DualOrderTradeManager, EntryPlan, TradeManagerSettings};
use crate::trading::trade_record::{CompletedTrade, EquityPoint};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounters {
    pub bars: usize,
    pub signals: usize,
    pub positions_opened: usize,
    /// Bars where the signal pipeline reported insufficient data.
    pub bars_skipped: usize,
    pub orders_rejected: usize,
    pub degenerate_selections: usize,
    pub degraded_sizing: usize,
}

/// Everything a run produces. Enough to recompute every metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub strategy: String,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub trades: Vec<CompletedTrade>,
    pub equity: Vec<EquityPoint>,
    pub counters: RunCounters,
}

/// Drives strategy, sizer and trade manager over a bar series, one bar at a time.
///
/// A simulator is single-use: `run` consumes it, so independent runs never
/// share state.
pub struct BacktestSimulator {
    config: Config,
    strategy: SignalStrategy,
    sizer: PositionSizer,
    manager: DualOrderTradeManager,
}

impl BacktestSimulator {
    pub fn new(config: &Config, factory: &StrategyFactory) -> Result<Self, ConfigError> {
        Self::with_sinks(
            config,
            factory,
            Box::new(SimulatedExecution::new()),
            Box::new(LogEventSink),
        )
    }

    pub fn with_sinks(
        config: &Config,
        factory: &StrategyFactory,
        execution: Box<dyn ExecutionSink>,
        events: Box<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let strategy = factory.build(&config.strategy, config)?;
        let sizer = PositionSizer::new(
            config.instrument.clone(),
            Box::new(SymbolListClassifier::new(&config.linear_symbols)),
            config.risk_percent,
        );
        let manager = DualOrderTradeManager::new(
            TradeManagerSettings {
                move_sl_to_breakeven: config.move_sl_to_breakeven,
                point_value: sizer.point_value(),
            },
            execution,
            events,
        );
        Ok(Self::from_parts(config.clone(), strategy, sizer, manager))
    }

    pub fn from_parts(
        config: Config,
        strategy: SignalStrategy,
        sizer: PositionSizer,
        manager: DualOrderTradeManager,
    ) -> Self {
        Self {
            config,
            strategy,
            sizer,
            manager,
        }
    }

    pub fn run(mut self, bars: &CandleSeries) -> BacktestResult {
        let initial_balance = self.config.initial_balance;
        let stride = self.config.equity_stride.max(1);
        let total = bars.len();
        let log_interval = total / 20;

        info!("=== BACKTEST START ===");
        info!(
            "{} | {} bars | strategy {} | initial balance ${:.2}",
            self.config.symbol,
            total,
            self.strategy.name(),
            initial_balance
        );
        if !bars.is_strictly_ordered() {
            warn!("bar timestamps are not strictly increasing");
        }

        let mut balance = initial_balance;
        let mut trades: Vec<CompletedTrade> = Vec::new();
        let mut equity = vec![EquityPoint {
            timestamp: bars
                .first()
                .map_or(DateTime::<Utc>::UNIX_EPOCH, |c| c.timestamp),
            balance,
            equity: balance,
        }];
        let mut counters = RunCounters::default();
        let mut history = CandleSeries::default();

        for (i, bar) in bars.iter().enumerate() {
            let is_last = i + 1 == total;
            counters.bars += 1;
            history.push(bar.clone());
            self.strategy.update(bar);

            for trade in self.manager.on_bar(bar) {
                balance += trade.pnl;
                trades.push(trade);
            }

            if self.manager.can_open() {
                self.try_open(&history, bar, balance, &mut counters);
            }

            if is_last {
                for trade in self.manager.force_close(bar) {
                    balance += trade.pnl;
                    trades.push(trade);
                }
            }

            if is_last || (i + 1) % stride == 0 {
                equity.push(EquityPoint {
                    timestamp: bar.timestamp,
                    balance,
                    equity: balance + self.manager.unrealized_pnl(bar.close),
                });
            }

            if log_interval > 0 && (i + 1) % log_interval == 0 {
                info!(
                    "  Progress: {:.0}% | {} | Balance: ${:.2} | Trades: {} | Signals: {}",
                    (i + 1) as f64 / total as f64 * 100.0,
                    bar.timestamp.format("%Y-%m-%d %H:%M"),
                    balance,
                    trades.len(),
                    counters.signals,
                );
            }
        }

        counters.degenerate_selections = self.strategy.degenerate_selections();

        info!("=== BACKTEST COMPLETE ===");
        info!(
            "{} trades from {} signals | final balance ${:.2}",
            trades.len(),
            counters.signals,
            balance
        );

        BacktestResult {
            symbol: self.config.symbol.clone(),
            strategy: self.strategy.name().to_string(),
            initial_balance,
            final_balance: balance,
            start: bars.first().map(|c| c.timestamp),
            end: bars.last().map(|c| c.timestamp),
            trades,
            equity,
            counters,
        }
    }

    fn try_open(&mut self, history: &CandleSeries, bar: &Candle, balance: f64, counters: &mut RunCounters) {
        let signal = match self.strategy.generate_signal(history) {
            Ok(Some(signal)) => signal,
            Ok(None) => return,
            Err(SignalError::DataInsufficient { have, need }) => {
                counters.bars_skipped += 1;
                debug!(have, need, "skipping bar {}", bar.timestamp);
                return;
            }
        };
        counters.signals += 1;

        let stop = signal.stop_loss(self.config.sl_multiplier);
        let sized = self.sizer.size(balance, signal.price, stop);
        if sized.degraded {
            counters.degraded_sizing += 1;
        }
        let plan = EntryPlan::from_signal(&signal, stop, sized.volume, self.config.tp_multiplier);

        match self.manager.open(&plan) {
            Ok(_) => counters.positions_opened += 1,
            Err(ExecutionError::OrderRejected(reason)) => {
                counters.orders_rejected += 1;
                warn!("{} signal at {} not taken: {}", signal.direction, signal.timestamp, reason);
            }
            Err(e) => warn!("{} signal at {} not taken: {}", signal.direction, signal.timestamp, e),
        }
    }
}
