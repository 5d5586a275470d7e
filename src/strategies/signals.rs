use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Direction;

/// A directional entry request produced for a single bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Close of the bar that produced the signal; used as the entry price.
    pub price: f64,
    pub atr: f64,
    pub timestamp: DateTime<Utc>,
    /// Factor of the track whose flip fired the signal.
    pub factor: f64,
}

impl Signal {
    /// Stop `sl_multiplier` ATRs away from the entry, on the losing side.
    pub fn stop_loss(&self, sl_multiplier: f64) -> f64 {
        self.price - self.direction.sign() * sl_multiplier * self.atr
    }
}
