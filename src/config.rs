use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Which performance cluster the factor selector should draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterChoice {
    Worst,
    Average,
    Best,
}

impl fmt::Display for ClusterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterChoice::Worst => write!(f, "worst"),
            ClusterChoice::Average => write!(f, "average"),
            ClusterChoice::Best => write!(f, "best"),
        }
    }
}

impl FromStr for ClusterChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "worst" => Ok(ClusterChoice::Worst),
            "average" => Ok(ClusterChoice::Average),
            "best" => Ok(ClusterChoice::Best),
            other => Err(ConfigError::InvalidParameter {
                name: "cluster_choice",
                reason: format!("expected worst|average|best, got `{other}`"),
            }),
        }
    }
}

/// Tick economics and volume limits for the traded instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub tick_size: f64,
    pub tick_value: f64,
    pub contract_size: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Instrument
    pub symbol: String,
    pub instrument: InstrumentSpec,
    /// Symbol fragments that mark an instrument as linear (priced per contract).
    pub linear_symbols: Vec<String>,

    // Account
    pub initial_balance: f64,
    pub risk_percent: f64,

    // Trend sweep
    pub atr_period: usize,
    pub min_factor: f64,
    pub max_factor: f64,
    pub factor_step: f64,
    pub perf_alpha: f64,
    pub perf_window: usize,
    pub cluster_choice: ClusterChoice,

    // Signal filter
    pub volume_ma_period: usize,
    pub volume_multiplier: f64,

    // Exits
    pub sl_multiplier: f64,
    pub tp_multiplier: f64,
    pub move_sl_to_breakeven: bool,

    // Simulation
    pub strategy: String,
    pub equity_stride: usize,
    pub annualization_factor: f64,

    // Files & logging
    pub data_file: String,
    pub output_dir: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            symbol: "EURUSD".to_string(),
            instrument: InstrumentSpec {
                symbol: "EURUSD".to_string(),
                tick_size: 0.00001,
                tick_value: 1.0,
                contract_size: 100_000.0,
                volume_min: 0.01,
                volume_max: 100.0,
                volume_step: 0.01,
            },
            linear_symbols: vec!["BTC".to_string(), "ETH".to_string()],
            initial_balance: 10_000.0,
            risk_percent: 1.0,
            atr_period: 10,
            min_factor: 1.0,
            max_factor: 5.0,
            factor_step: 0.5,
            perf_alpha: 10.0,
            perf_window: 100,
            cluster_choice: ClusterChoice::Best,
            volume_ma_period: 20,
            volume_multiplier: 1.5,
            sl_multiplier: 1.5,
            tp_multiplier: 3.0,
            move_sl_to_breakeven: true,
            strategy: "adaptive_trend".to_string(),
            equity_stride: 1,
            annualization_factor: 252.0,
            data_file: "data/bars.json".to_string(),
            output_dir: "output".to_string(),
            log_level: "INFO".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let d = Config::default();

        let symbol = env("SYMBOL", &d.symbol);
        let linear_symbols = env("LINEAR_SYMBOLS", &d.linear_symbols.join(","))
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        Config {
            instrument: InstrumentSpec {
                symbol: symbol.clone(),
                tick_size: env("TICK_SIZE", "0.00001").parse().unwrap_or(d.instrument.tick_size),
                tick_value: env("TICK_VALUE", "1").parse().unwrap_or(d.instrument.tick_value),
                contract_size: env("CONTRACT_SIZE", "100000")
                    .parse()
                    .unwrap_or(d.instrument.contract_size),
                volume_min: env("VOLUME_MIN", "0.01").parse().unwrap_or(d.instrument.volume_min),
                volume_max: env("VOLUME_MAX", "100").parse().unwrap_or(d.instrument.volume_max),
                volume_step: env("VOLUME_STEP", "0.01").parse().unwrap_or(d.instrument.volume_step),
            },
            symbol,
            linear_symbols,
            initial_balance: env("INITIAL_BALANCE", "10000").parse().unwrap_or(d.initial_balance),
            risk_percent: env("RISK_PERCENT", "1.0").parse().unwrap_or(d.risk_percent),
            atr_period: env("ATR_PERIOD", "10").parse().unwrap_or(d.atr_period),
            min_factor: env("MIN_FACTOR", "1.0").parse().unwrap_or(d.min_factor),
            max_factor: env("MAX_FACTOR", "5.0").parse().unwrap_or(d.max_factor),
            factor_step: env("FACTOR_STEP", "0.5").parse().unwrap_or(d.factor_step),
            perf_alpha: env("PERF_ALPHA", "10").parse().unwrap_or(d.perf_alpha),
            perf_window: env("PERF_WINDOW", "100").parse().unwrap_or(d.perf_window),
            cluster_choice: env("CLUSTER_CHOICE", "best").parse().unwrap_or(d.cluster_choice),
            volume_ma_period: env("VOLUME_MA_PERIOD", "20").parse().unwrap_or(d.volume_ma_period),
            volume_multiplier: env("VOLUME_MULTIPLIER", "1.5")
                .parse()
                .unwrap_or(d.volume_multiplier),
            sl_multiplier: env("SL_MULTIPLIER", "1.5").parse().unwrap_or(d.sl_multiplier),
            tp_multiplier: env("TP_MULTIPLIER", "3.0").parse().unwrap_or(d.tp_multiplier),
            move_sl_to_breakeven: env("MOVE_SL_TO_BREAKEVEN", "true").to_lowercase() == "true",
            strategy: env("STRATEGY", &d.strategy),
            equity_stride: env("EQUITY_STRIDE", "1").parse().unwrap_or(d.equity_stride),
            annualization_factor: env("ANNUALIZATION_FACTOR", "252")
                .parse()
                .unwrap_or(d.annualization_factor),
            data_file: env("DATA_FILE", &d.data_file),
            output_dir: env("OUTPUT_DIR", &d.output_dir),
            log_level: env("LOG_LEVEL", &d.log_level),
        }
    }

    /// Check the options that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_factor > 0.0) || self.min_factor >= self.max_factor {
            return Err(ConfigError::InvalidFactorRange {
                min: self.min_factor,
                max: self.max_factor,
            });
        }
        if !(self.factor_step > 0.0) || !self.factor_step.is_finite() {
            return Err(ConfigError::InvalidFactorStep(self.factor_step));
        }
        let positive_periods = [
            ("atr_period", self.atr_period),
            ("perf_window", self.perf_window),
            ("volume_ma_period", self.volume_ma_period),
        ];
        for (name, value) in positive_periods {
            if value == 0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if !(self.perf_alpha >= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "perf_alpha",
                reason: format!("must be >= 1, got {}", self.perf_alpha),
            });
        }
        if !(self.sl_multiplier > 0.0) || !(self.tp_multiplier > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "sl_multiplier/tp_multiplier",
                reason: "must be positive".to_string(),
            });
        }
        let spec = &self.instrument;
        let economics = [
            ("tick_size", spec.tick_size),
            ("tick_value", spec.tick_value),
            ("contract_size", spec.contract_size),
            ("volume_step", spec.volume_step),
            ("volume_min", spec.volume_min),
        ];
        for (name, value) in economics {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("must be positive, got {}", value),
                });
            }
        }
        if !(spec.volume_min <= spec.volume_max) {
            return Err(ConfigError::InvalidParameter {
                name: "volume_max",
                reason: format!("must be >= volume_min {}, got {}", spec.volume_min, spec.volume_max),
            });
        }
        if !(self.initial_balance > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "initial_balance",
                reason: format!("must be positive, got {}", self.initial_balance),
            });
        }
        Ok(())
    }

    /// Bars the signal pipeline needs before it can say anything.
    pub fn warmup_bars(&self) -> usize {
        self.atr_period.max(self.volume_ma_period) + 1
    }
}
