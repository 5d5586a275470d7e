use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::models::{Candle, CandleSeries};
use crate::trading::events::{EventSink, TradeEvent};

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Create candles from (open, high, low, close) tuples with auto-incrementing 1m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| bar(i, o, h, l, c))
        .collect();

    CandleSeries::new(candles)
}

pub fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: base_time() + Duration::minutes(i as i64),
        open,
        high,
        low,
        close,
        volume: 100.0,
    }
}

/// `n` quiet bars drifting up 0.01 per bar with one +30 breakout bar on
/// triple volume at index `breakout`. Returns the series and that index.
pub fn breakout_series(n: usize, breakout: usize) -> (CandleSeries, usize) {
    let mut candles = Vec::with_capacity(n);
    let mut close = 100.0;
    for i in 0..n {
        let c = if i == breakout {
            let open = close;
            close += 30.0;
            Candle {
                volume: 300.0,
                ..bar(i, open, close + 1.0, open - 1.0, close)
            }
        } else {
            let open = close;
            close += 0.01;
            bar(i, open, close + 1.0, close - 1.0, close)
        };
        candles.push(c);
    }
    (CandleSeries::new(candles), breakout)
}

/// Mirror of [`breakout_series`]: a +30 spike on plain volume at `spike`
/// turns every track up without confirmation, then a -60 drop on triple
/// volume at `breakdown` turns them down again.
pub fn breakdown_series(n: usize, spike: usize, breakdown: usize) -> CandleSeries {
    let mut candles = Vec::with_capacity(n);
    let mut close = 100.0;
    for i in 0..n {
        let open = close;
        let c = if i == spike {
            close += 30.0;
            bar(i, open, close + 1.0, open - 1.0, close)
        } else if i == breakdown {
            close -= 60.0;
            Candle {
                volume: 300.0,
                ..bar(i, open, open + 1.0, close - 1.0, close)
            }
        } else {
            close += 0.01;
            bar(i, open, close + 1.0, close - 1.0, close)
        };
        candles.push(c);
    }
    CandleSeries::new(candles)
}

/// Small sweep for tests: factors 1, 2, 3 over a 3-bar ATR.
pub fn sweep_config() -> Config {
    Config {
        symbol: "TESTUSD".to_string(),
        atr_period: 3,
        min_factor: 1.0,
        max_factor: 3.0,
        factor_step: 1.0,
        perf_alpha: 10.0,
        perf_window: 10,
        volume_ma_period: 20,
        volume_multiplier: 1.5,
        output_dir: std::env::temp_dir()
            .join("trend_cluster_bot_test")
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
        ..Config::default()
    }
}

/// Event sink whose clones share one buffer, so a test can keep a handle
/// after boxing it into the manager.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TradeEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TradeEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &TradeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
