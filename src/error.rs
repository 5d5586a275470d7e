use thiserror::Error;

use crate::trading::execution::LegId;

/// Construction-time configuration problems. These are fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid factor range: min_factor {min} must be positive and below max_factor {max}")]
    InvalidFactorRange { min: f64, max: f64 },

    #[error("invalid factor step {0}: must be positive and finite")]
    InvalidFactorStep(f64),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("no signal strategy registered under `{0}`")]
    UnknownStrategy(String),
}

/// Calculation-layer conditions. Callers recover from these locally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("insufficient data: have {have} bars, need {need}")]
    DataInsufficient { have: usize, need: usize },
}

/// Execution-layer failures reported by an [`ExecutionSink`](crate::trading::execution::ExecutionSink).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("leg {0} is stale or missing")]
    StaleOrMissingPosition(LegId),

    #[error("a position is already open")]
    PositionAlreadyOpen,
}
