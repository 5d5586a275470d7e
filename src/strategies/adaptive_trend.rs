use tracing::debug;

use crate::config::Config;
use crate::core::factor_selector::{FactorSelection, FactorSelector};
use crate::core::factor_trend::{FactorTrack, MultiFactorTrend};
use crate::error::{ConfigError, SignalError};
use crate::models::{Candle, CandleSeries};
use crate::strategies::signals::Signal;

/// Turns a track flip into a signal when volume confirms it.
#[derive(Debug, Clone)]
pub struct TrendSignalGenerator {
    volume_ma_period: usize,
    volume_multiplier: f64,
}

impl TrendSignalGenerator {
    pub fn new(volume_ma_period: usize, volume_multiplier: f64) -> Self {
        Self {
            volume_ma_period: volume_ma_period.max(1),
            volume_multiplier,
        }
    }

    /// Current volume above the trailing mean (current bar included) times the multiplier.
    pub fn volume_confirms(&self, history: &CandleSeries) -> Result<bool, SignalError> {
        let avg = history
            .mean_volume(self.volume_ma_period)
            .ok_or(SignalError::DataInsufficient {
                have: history.len(),
                need: self.volume_ma_period,
            })?;
        let current = history.last().map_or(0.0, |c| c.volume);
        Ok(current > avg * self.volume_multiplier)
    }

    /// Signal for the last bar of `history` if `track` flipped on it.
    pub fn generate(
        &self,
        history: &CandleSeries,
        track: &FactorTrack,
        atr: f64,
    ) -> Result<Option<Signal>, SignalError> {
        let bar = history.last().ok_or(SignalError::DataInsufficient {
            have: 0,
            need: self.volume_ma_period,
        })?;
        let confirmed = self.volume_confirms(history)?;

        let Some(trend) = track.flipped() else {
            return Ok(None);
        };
        if !confirmed {
            debug!(factor = track.factor, %trend, "flip without volume confirmation");
            return Ok(None);
        }

        Ok(Some(Signal {
            direction: trend.to_direction(),
            price: bar.close,
            atr,
            timestamp: bar.timestamp,
            factor: track.factor,
        }))
    }
}

/// Factor sweep + cluster selection + flip/volume entry rule.
#[derive(Debug, Clone)]
pub struct AdaptiveTrendStrategy {
    trend: MultiFactorTrend,
    selector: FactorSelector,
    generator: TrendSignalGenerator,
    warmup: usize,
    last_selection: Option<FactorSelection>,
    degenerate_selections: usize,
}

impl AdaptiveTrendStrategy {
    pub fn new(cfg: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            trend: MultiFactorTrend::new(cfg)?,
            selector: FactorSelector::new(cfg.cluster_choice),
            generator: TrendSignalGenerator::new(cfg.volume_ma_period, cfg.volume_multiplier),
            warmup: cfg.warmup_bars(),
            last_selection: None,
            degenerate_selections: 0,
        })
    }

    pub fn update(&mut self, candle: &Candle) {
        self.trend.update(candle);
    }

    pub fn evaluate(&mut self, history: &CandleSeries) -> Result<Option<Signal>, SignalError> {
        let need = self.warmup;
        if history.len() < need || !self.trend.is_ready() {
            return Err(SignalError::DataInsufficient {
                have: history.len(),
                need,
            });
        }
        let atr = self.trend.atr().ok_or(SignalError::DataInsufficient {
            have: history.len(),
            need,
        })?;

        let selection = self
            .selector
            .select(self.trend.tracks())
            .ok_or(SignalError::DataInsufficient {
                have: history.len(),
                need,
            })?;
        if selection.degenerate {
            self.degenerate_selections += 1;
        }

        let track = self
            .trend
            .nearest_track(selection.factor)
            .ok_or(SignalError::DataInsufficient {
                have: history.len(),
                need,
            })?;
        let signal = self.generator.generate(history, track, atr)?;
        self.last_selection = Some(selection);
        Ok(signal)
    }

    pub fn trend(&self) -> &MultiFactorTrend {
        &self.trend
    }

    pub fn last_selection(&self) -> Option<&FactorSelection> {
        self.last_selection.as_ref()
    }

    pub fn degenerate_selections(&self) -> usize {
        self.degenerate_selections
    }
}
