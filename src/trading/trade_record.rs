use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegRole {
    Quick,
    Main,
}

impl fmt::Display for LegRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegRole::Quick => write!(f, "quick"),
            LegRole::Main => write!(f, "main"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    EndOfRun,
    /// Sibling leg undone after a rejected paired order. Never recorded as a trade.
    Rollback,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TakeProfit => write!(f, "take_profit"),
            CloseReason::EndOfRun => write!(f, "end_of_run"),
            CloseReason::Rollback => write!(f, "rollback"),
        }
    }
}

/// One closed leg. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub position_id: u64,
    pub role: LegRole,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub volume: f64,
    pub pnl: f64,
    pub reason: CloseReason,
}

impl CompletedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn hold_duration_seconds(&self) -> i64 {
        (self.exit_time - self.entry_time).num_seconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    /// Balance plus unrealized P/L of active legs at the bar close.
    pub equity: f64,
}
