pub mod historical;

pub use historical::HistoricalSource;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Candle, CandleSeries};

/// Supplies bars oldest-first. `None` means the feed is exhausted.
#[async_trait]
pub trait BarSource: Send {
    fn symbol(&self) -> &str;

    async fn next_bar(&mut self) -> Result<Option<Candle>>;
}

/// Drain a source into a series.
pub async fn collect_bars<S: BarSource>(mut source: S) -> Result<CandleSeries> {
    let mut series = CandleSeries::default();
    while let Some(bar) = source.next_bar().await? {
        series.push(bar);
    }
    Ok(series)
}
