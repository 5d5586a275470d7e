pub mod adaptive_trend;
pub mod signals;

use std::collections::HashMap;

use crate::config::Config;
use crate::error::{ConfigError, SignalError};
use crate::models::{Candle, CandleSeries};

pub use adaptive_trend::{AdaptiveTrendStrategy, TrendSignalGenerator};
pub use signals::Signal;

/// Signal strategies known to the engine. Chosen once at construction.
#[derive(Debug, Clone)]
pub enum SignalStrategy {
    AdaptiveTrend(AdaptiveTrendStrategy),
}

impl SignalStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SignalStrategy::AdaptiveTrend(_) => "adaptive_trend",
        }
    }

    /// Feed a new bar into the strategy's running state. Called on every bar.
    pub fn update(&mut self, candle: &Candle) {
        match self {
            SignalStrategy::AdaptiveTrend(s) => s.update(candle),
        }
    }

    /// Signal for the last bar of `history`, if any.
    pub fn generate_signal(&mut self, history: &CandleSeries) -> Result<Option<Signal>, SignalError> {
        match self {
            SignalStrategy::AdaptiveTrend(s) => s.evaluate(history),
        }
    }

    /// Bars where clustering fell back to the argmax factor.
    pub fn degenerate_selections(&self) -> usize {
        match self {
            SignalStrategy::AdaptiveTrend(s) => s.degenerate_selections(),
        }
    }
}

pub type StrategyBuilder = fn(&Config) -> Result<SignalStrategy, ConfigError>;

/// Name → builder map, constructed once at startup and passed to whoever builds strategies.
#[derive(Clone)]
pub struct StrategyFactory {
    builders: HashMap<&'static str, StrategyBuilder>,
}

impl StrategyFactory {
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Factory with every built-in strategy registered.
    pub fn with_defaults() -> Self {
        let mut factory = Self::empty();
        factory.register("adaptive_trend", |cfg| {
            Ok(SignalStrategy::AdaptiveTrend(AdaptiveTrendStrategy::new(cfg)?))
        });
        factory
    }

    pub fn register(&mut self, name: &'static str, builder: StrategyBuilder) {
        self.builders.insert(name, builder);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.builders.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn build(&self, name: &str, cfg: &Config) -> Result<SignalStrategy, ConfigError> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))?;
        builder(cfg)
    }
}
