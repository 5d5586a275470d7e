use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::Config;
use crate::core::atr::Atr;
use crate::error::ConfigError;
use crate::models::{Candle, Trend};

/// One banded trend-following track for a single sensitivity factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorTrack {
    pub factor: f64,
    pub upper: f64,
    pub lower: f64,
    pub trend: Trend,
    pub prev_trend: Trend,
    /// Active band: lower (support) in an uptrend, upper (resistance) in a downtrend.
    pub output: f64,
    pub perf: f64,
    pub vol_adjusted_perf: f64,
    recent: VecDeque<f64>,
    window: usize,
}

impl FactorTrack {
    fn start(factor: f64, candle: &Candle, atr: f64, window: usize) -> Self {
        let hl2 = candle.hl2();
        let upper = hl2 + factor * atr;
        Self {
            factor,
            upper,
            lower: hl2 - factor * atr,
            trend: Trend::Down,
            prev_trend: Trend::Down,
            output: upper,
            perf: 0.0,
            vol_adjusted_perf: 0.0,
            recent: VecDeque::with_capacity(window),
            window,
        }
    }

    fn advance(&mut self, candle: &Candle, prev_close: f64, atr: f64, alpha: f64) {
        let hl2 = candle.hl2();
        let basic_upper = hl2 + self.factor * atr;
        let basic_lower = hl2 - self.factor * atr;

        let prev_upper = self.upper;
        let prev_lower = self.lower;
        let prev_output = self.output;

        // Bands only tighten while price stays inside them.
        self.upper = if prev_close < prev_upper {
            basic_upper.min(prev_upper)
        } else {
            basic_upper
        };
        self.lower = if prev_close > prev_lower {
            basic_lower.max(prev_lower)
        } else {
            basic_lower
        };

        self.prev_trend = self.trend;
        if candle.close > prev_upper {
            self.trend = Trend::Up;
        } else if candle.close < prev_lower {
            self.trend = Trend::Down;
        }

        self.output = match self.trend {
            Trend::Up => self.lower,
            Trend::Down => self.upper,
        };

        let diff = (candle.close - prev_close) * sign(prev_close - prev_output);
        let norm_vol = if candle.close != 0.0 { atr / candle.close } else { 0.0 };
        let adjusted = diff / (1.0 + norm_vol);

        self.perf += alpha * (diff - self.perf);
        self.vol_adjusted_perf += alpha * (adjusted - self.vol_adjusted_perf);

        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(self.vol_adjusted_perf);
    }

    /// The new trend if this bar reversed the track.
    pub fn flipped(&self) -> Option<Trend> {
        (self.trend != self.prev_trend).then_some(self.trend)
    }

    /// Mean volatility-adjusted performance over the trailing window. NaN before any update.
    pub fn score(&self) -> f64 {
        if self.recent.is_empty() {
            return f64::NAN;
        }
        self.recent.iter().sum::<f64>() / self.recent.len() as f64
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Ascending factor list `min, min + step, ...` up to `max`.
pub fn factor_range(min: f64, max: f64, step: f64) -> Result<Vec<f64>, ConfigError> {
    if !(min > 0.0) || !(min < max) || !max.is_finite() {
        return Err(ConfigError::InvalidFactorRange { min, max });
    }
    if !(step > 0.0) || !step.is_finite() {
        return Err(ConfigError::InvalidFactorStep(step));
    }
    let count = ((max - min) / step + 1e-9).floor() as usize;
    Ok((0..=count).map(|k| (min + k as f64 * step).min(max)).collect())
}

/// Maintains one [`FactorTrack`] per configured factor, updated bar by bar.
#[derive(Debug, Clone)]
pub struct MultiFactorTrend {
    factors: Vec<f64>,
    atr: Atr,
    alpha: f64,
    window: usize,
    tracks: Vec<FactorTrack>,
    prev_close: Option<f64>,
}

impl MultiFactorTrend {
    pub fn new(cfg: &Config) -> Result<Self, ConfigError> {
        let factors = factor_range(cfg.min_factor, cfg.max_factor, cfg.factor_step)?;
        if !(cfg.perf_alpha >= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "perf_alpha",
                reason: format!("must be >= 1, got {}", cfg.perf_alpha),
            });
        }
        Ok(Self {
            factors,
            atr: Atr::new(cfg.atr_period),
            alpha: 2.0 / (cfg.perf_alpha + 1.0),
            window: cfg.perf_window.max(1),
            tracks: Vec::new(),
            prev_close: None,
        })
    }

    pub fn update(&mut self, candle: &Candle) {
        let atr = self.atr.update(candle);

        if let Some(atr) = atr {
            if self.tracks.is_empty() {
                self.tracks = self
                    .factors
                    .iter()
                    .map(|&f| FactorTrack::start(f, candle, atr, self.window))
                    .collect();
            } else if let Some(prev_close) = self.prev_close {
                for track in &mut self.tracks {
                    track.advance(candle, prev_close, atr, self.alpha);
                }
            }
        }

        self.prev_close = Some(candle.close);
    }

    pub fn is_ready(&self) -> bool {
        !self.tracks.is_empty()
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn tracks(&self) -> &[FactorTrack] {
        &self.tracks
    }

    pub fn atr(&self) -> Option<f64> {
        self.atr.value()
    }

    /// Track whose factor is closest to `factor`; ties go to the smaller factor.
    pub fn nearest_track(&self, factor: f64) -> Option<&FactorTrack> {
        self.tracks.iter().fold(None, |best: Option<&FactorTrack>, t| match best {
            Some(b) if (b.factor - factor).abs() <= (t.factor - factor).abs() => Some(b),
            _ => Some(t),
        })
    }
}
