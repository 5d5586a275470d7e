use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::ExecutionError;
use crate::models::Direction;
use crate::trading::trade_record::{CloseReason, LegRole};

pub type LegId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegRequest {
    pub role: LegRole,
    pub direction: Direction,
    pub volume: f64,
    pub entry: f64,
    pub stop: f64,
    pub take_profit: f64,
}

/// Two legs sharing one entry and one stop; only the targets differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedOrder {
    pub direction: Direction,
    pub total_volume: f64,
    pub entry: f64,
    pub stop: f64,
    pub quick_tp: f64,
    pub main_tp: f64,
}

impl PairedOrder {
    /// Split the total volume evenly between the quick and main legs.
    pub fn legs(&self) -> (LegRequest, LegRequest) {
        let quick_volume = self.total_volume / 2.0;
        let main_volume = self.total_volume - quick_volume;
        let leg = |role, volume, take_profit| LegRequest {
            role,
            direction: self.direction,
            volume,
            entry: self.entry,
            stop: self.stop,
            take_profit,
        };
        (
            leg(LegRole::Quick, quick_volume, self.quick_tp),
            leg(LegRole::Main, main_volume, self.main_tp),
        )
    }
}

/// Where orders go: a simulated book for backtests, a broker bridge in live use.
pub trait ExecutionSink: Send {
    fn open_leg(&mut self, request: &LegRequest) -> Result<LegId, ExecutionError>;

    fn modify_stop(&mut self, leg: LegId, new_stop: f64) -> Result<(), ExecutionError>;

    fn close_leg(&mut self, leg: LegId, reason: CloseReason) -> Result<(), ExecutionError>;

    /// Open both legs, or neither: a rejected main leg rolls back the quick leg.
    fn open_paired_order(&mut self, order: &PairedOrder) -> Result<(LegId, LegId), ExecutionError> {
        let (quick, main) = order.legs();
        let quick_id = self.open_leg(&quick)?;
        match self.open_leg(&main) {
            Ok(main_id) => Ok((quick_id, main_id)),
            Err(e) => {
                if let Err(rollback) = self.close_leg(quick_id, CloseReason::Rollback) {
                    warn!(leg = quick_id, error = %rollback, "rollback of quick leg failed");
                }
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedLeg {
    pub request: LegRequest,
    pub stop: f64,
    pub open: bool,
    pub close_reason: Option<CloseReason>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedExecution {
    next_id: LegId,
    legs: BTreeMap<LegId, SimulatedLeg>,
    accept_limit: Option<usize>,
    accepted: usize,
}

impl SimulatedExecution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book that rejects every leg after the first `n` it accepts.
    pub fn rejecting_after(n: usize) -> Self {
        Self {
            accept_limit: Some(n),
            ..Self::default()
        }
    }

    pub fn leg(&self, id: LegId) -> Option<&SimulatedLeg> {
        self.legs.get(&id)
    }

    pub fn open_legs(&self) -> usize {
        self.legs.values().filter(|l| l.open).count()
    }

    fn live_leg(&mut self, id: LegId) -> Result<&mut SimulatedLeg, ExecutionError> {
        self.legs
            .get_mut(&id)
            .filter(|l| l.open)
            .ok_or(ExecutionError::StaleOrMissingPosition(id))
    }
}

impl ExecutionSink for SimulatedExecution {
    fn open_leg(&mut self, request: &LegRequest) -> Result<LegId, ExecutionError> {
        if self.accept_limit.is_some_and(|limit| self.accepted >= limit) {
            return Err(ExecutionError::OrderRejected(format!(
                "simulated rejection of {} leg",
                request.role
            )));
        }
        if !(request.volume > 0.0) {
            return Err(ExecutionError::OrderRejected(format!(
                "volume {} is not positive",
                request.volume
            )));
        }
        self.next_id += 1;
        self.accepted += 1;
        self.legs.insert(
            self.next_id,
            SimulatedLeg {
                request: request.clone(),
                stop: request.stop,
                open: true,
                close_reason: None,
            },
        );
        Ok(self.next_id)
    }

    fn modify_stop(&mut self, leg: LegId, new_stop: f64) -> Result<(), ExecutionError> {
        self.live_leg(leg)?.stop = new_stop;
        Ok(())
    }

    fn close_leg(&mut self, leg: LegId, reason: CloseReason) -> Result<(), ExecutionError> {
        let l = self.live_leg(leg)?;
        l.open = false;
        l.close_reason = Some(reason);
        Ok(())
    }
}
