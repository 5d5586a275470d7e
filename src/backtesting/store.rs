use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::models::{Candle, CandleSeries};

use super::report::{BacktestReport, PerformanceMetrics};
use super::runner::BacktestResult;

/// Parse a JSON array of candles, oldest first.
pub fn parse_candles(json: &str) -> Result<CandleSeries> {
    let candles: Vec<Candle> = serde_json::from_str(json).context("candle file is not a JSON candle array")?;
    let series = CandleSeries::new(candles);
    if !series.is_strictly_ordered() {
        bail!("candle timestamps must be strictly increasing");
    }
    Ok(series)
}

pub fn load_candles(path: impl AsRef<Path>) -> Result<CandleSeries> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading candles from {}", path.display()))?;
    let series = parse_candles(&content).with_context(|| format!("parsing {}", path.display()))?;
    info!("Loaded {} candles from {}", series.len(), path.display());
    Ok(series)
}

pub fn save_candles(path: impl AsRef<Path>, candles: &CandleSeries) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(candles.as_slice())?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// A finished run as written to disk: the settings used and the raw result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub config: Config,
    pub result: BacktestResult,
}

impl RunArtifacts {
    pub fn new(config: &Config, result: BacktestResult) -> Self {
        Self {
            config: config.clone(),
            result,
        }
    }

    /// Metrics rebuilt from the stored trades and equity curve alone.
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::compute(
            &self.result.trades,
            &self.result.equity,
            self.config.annualization_factor,
        )
    }

    pub fn report(&self) -> BacktestReport {
        BacktestReport::from_result(&self.result, self.config.annualization_factor)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing run to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading run from {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing run file {}", path.display()))
    }
}

/// `<output_dir>/<prefix>_<symbol>_<start>_<end>.<ext>`, timestamps as yyyymmdd.
pub fn output_path(cfg: &Config, result: &BacktestResult, prefix: &str, ext: &str) -> PathBuf {
    let day = |ts: Option<chrono::DateTime<chrono::Utc>>| {
        ts.map_or_else(|| "empty".to_string(), |t| t.format("%Y%m%d").to_string())
    };
    Path::new(&cfg.output_dir).join(format!(
        "{}_{}_{}_{}.{}",
        prefix,
        cfg.symbol,
        day(result.start),
        day(result.end),
        ext
    ))
}

/// Write the text rendering of `report` to `path`.
pub fn save_report_to_file(report: &BacktestReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, report.render()).with_context(|| format!("writing report to {}", path.display()))?;
    Ok(())
}
