use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::InstrumentSpec;

/// How price movement converts into account currency for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// Forex-like: P/L counted in ticks of `tick_size`, each worth `tick_value`.
    TickPriced,
    /// Priced directly in account currency: P/L = move × contract size.
    Linear,
}

/// Decides which sizing formula applies to an instrument.
pub trait InstrumentClassifier: Send + Sync {
    fn classify(&self, instrument: &InstrumentSpec) -> ContractKind;
}

/// Classifies by symbol substring: any configured marker makes the instrument linear.
#[derive(Debug, Clone, Default)]
pub struct SymbolListClassifier {
    linear_markers: Vec<String>,
}

impl SymbolListClassifier {
    pub fn new(markers: &[String]) -> Self {
        Self {
            linear_markers: markers.iter().map(|m| m.to_uppercase()).collect(),
        }
    }
}

impl InstrumentClassifier for SymbolListClassifier {
    fn classify(&self, instrument: &InstrumentSpec) -> ContractKind {
        let symbol = instrument.symbol.to_uppercase();
        if self.linear_markers.iter().any(|m| symbol.contains(m.as_str())) {
            ContractKind::Linear
        } else {
            ContractKind::TickPriced
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClassifier(pub ContractKind);

impl InstrumentClassifier for FixedClassifier {
    fn classify(&self, _instrument: &InstrumentSpec) -> ContractKind {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizedVolume {
    pub volume: f64,
    pub risk_amount: f64,
    pub kind: ContractKind,
    /// Set when the inputs were unusable and `volume_min` was returned instead.
    pub degraded: bool,
}

pub struct PositionSizer {
    instrument: InstrumentSpec,
    classifier: Box<dyn InstrumentClassifier>,
    risk_percent: f64,
}

impl PositionSizer {
    pub fn new(
        instrument: InstrumentSpec,
        classifier: Box<dyn InstrumentClassifier>,
        risk_percent: f64,
    ) -> Self {
        Self {
            instrument,
            classifier,
            risk_percent,
        }
    }

    pub fn kind(&self) -> ContractKind {
        self.classifier.classify(&self.instrument)
    }

    /// Account-currency value of a one-unit price move for one unit of volume.
    pub fn point_value(&self) -> f64 {
        match self.kind() {
            ContractKind::Linear => self.instrument.contract_size,
            ContractKind::TickPriced => {
                if self.instrument.tick_size > 0.0 {
                    self.instrument.tick_value / self.instrument.tick_size
                } else {
                    0.0
                }
            }
        }
    }

    /// Volume that risks `risk_percent` of `balance` between `entry` and `stop`.
    ///
    /// Never fails: a zero or non-finite stop distance, or a non-positive
    /// tick or contract size, yields `volume_min` with `degraded` set.
    pub fn size(&self, balance: f64, entry: f64, stop: f64) -> SizedVolume {
        let kind = self.kind();
        let risk_amount = balance * self.risk_percent / 100.0;
        let distance = (entry - stop).abs();

        let degraded = |reason: &str| {
            warn!(
                symbol = %self.instrument.symbol,
                entry,
                stop,
                "{}, falling back to minimum volume",
                reason
            );
            SizedVolume {
                volume: self.instrument.volume_min,
                risk_amount,
                kind,
                degraded: true,
            }
        };

        if !distance.is_finite() || distance <= 0.0 {
            return degraded("invalid stop distance");
        }

        let spec = &self.instrument;
        let economics_valid = match kind {
            ContractKind::Linear => positive(spec.contract_size),
            ContractKind::TickPriced => positive(spec.tick_size) && positive(spec.tick_value),
        };
        if !economics_valid {
            return degraded("invalid instrument economics");
        }

        let raw = match kind {
            ContractKind::Linear => risk_amount / (distance * self.instrument.contract_size),
            ContractKind::TickPriced => {
                let ticks = distance / self.instrument.tick_size;
                risk_amount / (ticks * self.instrument.tick_value)
            }
        };

        if !raw.is_finite() || raw < 0.0 {
            return degraded("non-finite raw volume");
        }

        SizedVolume {
            volume: self.normalize(raw),
            risk_amount,
            kind,
            degraded: false,
        }
    }

    fn normalize(&self, raw: f64) -> f64 {
        let spec = &self.instrument;
        let stepped = if spec.volume_step > 0.0 {
            let steps = (raw / spec.volume_step).round();
            // Trim representation noise such as 0.30000000000000004.
            round_to(steps * spec.volume_step, 8)
        } else {
            raw
        };
        stepped.max(spec.volume_min).min(spec.volume_max)
    }
}

fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let m = 10f64.powi(decimals);
    (x * m).round() / m
}
