use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::Direction;
use crate::trading::execution::LegId;
use crate::trading::trade_record::CompletedTrade;

/// Position lifecycle notifications emitted by the trade manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeEvent {
    Opened {
        position_id: u64,
        direction: Direction,
        entry: f64,
        stop: f64,
        quick_tp: f64,
        main_tp: f64,
        volume: f64,
    },
    LegClosed(CompletedTrade),
    BreakevenApplied {
        position_id: u64,
        stop: f64,
    },
    OrderRejected {
        reason: String,
    },
    /// A modify or close hit a leg the execution side no longer knows about.
    StaleLeg {
        leg: LegId,
    },
}

/// Receives trade events. Handed to the trade manager at construction.
pub trait EventSink: Send {
    fn emit(&mut self, event: &TradeEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &TradeEvent) {
        match event {
            TradeEvent::Opened {
                position_id,
                direction,
                entry,
                stop,
                quick_tp,
                main_tp,
                volume,
            } => info!(
                "Position #{} {} {:.4} @ {:.5} SL {:.5} TP1 {:.5} TP2 {:.5}",
                position_id, direction, volume, entry, stop, quick_tp, main_tp
            ),
            TradeEvent::LegClosed(t) => info!(
                "Position #{} {} leg closed ({}) @ {:.5} PnL {:+.2}",
                t.position_id, t.role, t.reason, t.exit_price, t.pnl
            ),
            TradeEvent::BreakevenApplied { position_id, stop } => {
                info!("Position #{} main leg stop moved to breakeven {:.5}", position_id, stop)
            }
            TradeEvent::OrderRejected { reason } => warn!("Paired order rejected: {}", reason),
            TradeEvent::StaleLeg { leg } => debug!("Leg {} already gone, ignoring", leg),
        }
    }
}
