use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::backtesting::store::parse_candles;
use crate::exchange::BarSource;
use crate::models::{Candle, CandleSeries};

/// A BarSource that replays pre-loaded historical candles oldest-first.
pub struct HistoricalSource {
    symbol: String,
    candles: Vec<Candle>,
    cursor: usize,
}

impl HistoricalSource {
    pub fn new(symbol: &str, candles: CandleSeries) -> Self {
        Self {
            symbol: symbol.to_string(),
            candles: candles.as_slice().to_vec(),
            cursor: 0,
        }
    }

    /// Read a JSON candle array from disk.
    pub async fn from_file(symbol: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading candles from {}", path.display()))?;
        let series = parse_candles(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(symbol, series))
    }

    /// Keep only candles with `start <= timestamp <= end`.
    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        let lo = start.map_or(0, |s| self.candles.partition_point(|c| c.timestamp < s));
        let hi = end.map_or(self.candles.len(), |e| {
            self.candles.partition_point(|c| c.timestamp <= e)
        });
        self.candles = if lo < hi {
            self.candles[lo..hi].to_vec()
        } else {
            Vec::new()
        };
        self.cursor = 0;
        self
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.candles.len() - self.cursor
    }
}

#[async_trait]
impl BarSource for HistoricalSource {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn next_bar(&mut self) -> Result<Option<Candle>> {
        let bar = self.candles.get(self.cursor).cloned();
        if bar.is_some() {
            self.cursor += 1;
        }
        Ok(bar)
    }
}
