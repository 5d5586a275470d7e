use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Midpoint of the bar's range, the anchor for the trend bands.
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn total_range(&self) -> f64 {
        self.high - self.low
    }

    /// True range against the previous close, or the plain range for the first bar.
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        match prev_close {
            Some(pc) => self
                .total_range()
                .max((self.high - pc).abs())
                .max((self.low - pc).abs()),
            None => self.total_range(),
        }
    }
}

/// Ordered, append-only bar history.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// Mean volume of the last `n` bars. `None` if fewer than `n` bars exist.
    pub fn mean_volume(&self, n: usize) -> Option<f64> {
        if n == 0 || self.candles.len() < n {
            return None;
        }
        let window = self.tail(n);
        Some(window.iter().map(|c| c.volume).sum::<f64>() / n as f64)
    }

    pub fn is_strictly_ordered(&self) -> bool {
        self.candles
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp)
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;
    fn index(&self, index: usize) -> &Self::Output {
        &self.candles[index]
    }
}

impl IntoIterator for CandleSeries {
    type Item = Candle;
    type IntoIter = std::vec::IntoIter<Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
