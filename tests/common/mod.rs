#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use trend_cluster_bot::config::Config;
use trend_cluster_bot::models::{Candle, CandleSeries};
use trend_cluster_bot::trading::{EventSink, TradeEvent};

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
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

/// Create candles from (open, high, low, close) tuples with auto-incrementing 1m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    CandleSeries::new(
        data.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| bar(i, o, h, l, c))
            .collect(),
    )
}

/// Quiet upward drift with a single high-volume +30 breakout bar.
pub fn breakout_series(n: usize, breakout: usize) -> CandleSeries {
    let mut close = 100.0;
    let candles = (0..n)
        .map(|i| {
            let open = close;
            if i == breakout {
                close += 30.0;
                Candle {
                    volume: 300.0,
                    ..bar(i, open, close + 1.0, open - 1.0, close)
                }
            } else {
                close += 0.01;
                bar(i, open, close + 1.0, close - 1.0, close)
            }
        })
        .collect();
    CandleSeries::new(candles)
}

/// Deterministic swinging series with periodic volume spikes, so that
/// tracks flip in both directions and some flips pass the volume filter.
pub fn swing_series(n: usize) -> CandleSeries {
    let candles = (0..n)
        .map(|i| {
            let t = i as f64;
            let mid = 100.0 + 12.0 * (t / 25.0).sin() + 4.0 * (t / 7.0).sin();
            let prev = 100.0 + 12.0 * ((t - 1.0) / 25.0).sin() + 4.0 * ((t - 1.0) / 7.0).sin();
            let spread = 0.8 + 0.4 * (t / 3.0).cos().abs();
            Candle {
                volume: if i % 9 == 0 { 400.0 } else { 100.0 + (i % 5) as f64 * 10.0 },
                ..bar(
                    i,
                    prev,
                    mid.max(prev) + spread,
                    mid.min(prev) - spread,
                    mid,
                )
            }
        })
        .collect();
    CandleSeries::new(candles)
}

pub fn test_config() -> Config {
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
            .join(format!("trend_cluster_integ_{}", std::process::id()))
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
        ..Config::default()
    }
}

#[derive(Clone, Default)]
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
