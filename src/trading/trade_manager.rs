use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::models::{Candle, Direction};
use crate::strategies::signals::Signal;
use crate::trading::events::{EventSink, TradeEvent};
use crate::trading::execution::{ExecutionSink, LegId, PairedOrder};
use crate::trading::trade_record::{CloseReason, CompletedTrade, LegRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub id: LegId,
    pub role: LegRole,
    pub volume: f64,
    pub take_profit: f64,
    pub active: bool,
}

/// The single open position: two legs on one entry and one stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub direction: Direction,
    pub entry_price: f64,
    pub total_volume: f64,
    pub stop_loss: f64,
    pub quick_leg: Leg,
    pub main_leg: Leg,
    pub breakeven_applied: bool,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn has_active_leg(&self) -> bool {
        self.quick_leg.active || self.main_leg.active
    }

    /// Signed P/L of the active legs if closed at `price`.
    pub fn unrealized_pnl(&self, price: f64, point_value: f64) -> f64 {
        [&self.quick_leg, &self.main_leg]
            .into_iter()
            .filter(|l| l.active)
            .map(|l| self.direction.sign() * (price - self.entry_price) * l.volume * point_value)
            .sum()
    }

    fn leg_mut(&mut self, role: LegRole) -> &mut Leg {
        match role {
            LegRole::Quick => &mut self.quick_leg,
            LegRole::Main => &mut self.main_leg,
        }
    }
}

/// Lifecycle of the manager's position slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    /// Both legs opened; with breakeven disabled this persists after the quick leg closes.
    Opened(Position),
    /// Quick leg closed and main leg stop moved to entry.
    QuickClosed(Position),
    Closed,
}

impl PositionState {
    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Opened(p) | PositionState::QuickClosed(p) => Some(p),
            PositionState::Flat | PositionState::Closed => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.position().is_some()
    }

    pub fn label(&self) -> &'static str {
        match self {
            PositionState::Flat => "flat",
            PositionState::Opened(_) => "opened",
            PositionState::QuickClosed(_) => "quick_closed",
            PositionState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    pub quick_tp: f64,
    pub main_tp: f64,
    pub volume: f64,
    pub opened_at: DateTime<Utc>,
}

impl EntryPlan {
    /// Quick target at 1:1 and main target at `tp_multiplier`:1 from the shared stop.
    pub fn from_signal(signal: &Signal, stop: f64, volume: f64, tp_multiplier: f64) -> Self {
        let risk = (signal.price - stop).abs();
        let sign = signal.direction.sign();
        Self {
            direction: signal.direction,
            entry: signal.price,
            stop,
            quick_tp: signal.price + sign * risk,
            main_tp: signal.price + sign * risk * tp_multiplier,
            volume,
            opened_at: signal.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeManagerSettings {
    pub move_sl_to_breakeven: bool,
    pub point_value: f64,
}

/// Owns the one open position and drives it through its two-leg lifecycle.
pub struct DualOrderTradeManager {
    state: PositionState,
    settings: TradeManagerSettings,
    execution: Box<dyn ExecutionSink>,
    events: Box<dyn EventSink>,
    next_position_id: u64,
}

impl DualOrderTradeManager {
    pub fn new(
        settings: TradeManagerSettings,
        execution: Box<dyn ExecutionSink>,
        events: Box<dyn EventSink>,
    ) -> Self {
        Self {
            state: PositionState::Flat,
            settings,
            execution,
            events,
            next_position_id: 0,
        }
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.state.position()
    }

    pub fn can_open(&self) -> bool {
        !self.state.is_open()
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.position()
            .map_or(0.0, |p| p.unrealized_pnl(price, self.settings.point_value))
    }

    /// Open both legs. A rejection leaves the manager without a position.
    pub fn open(&mut self, plan: &EntryPlan) -> Result<Position, ExecutionError> {
        if self.state.is_open() {
            return Err(ExecutionError::PositionAlreadyOpen);
        }

        let order = PairedOrder {
            direction: plan.direction,
            total_volume: plan.volume,
            entry: plan.entry,
            stop: plan.stop,
            quick_tp: plan.quick_tp,
            main_tp: plan.main_tp,
        };
        let (quick_id, main_id) = match self.execution.open_paired_order(&order) {
            Ok(ids) => ids,
            Err(e) => {
                self.events.emit(&TradeEvent::OrderRejected {
                    reason: e.to_string(),
                });
                self.state = PositionState::Flat;
                return Err(e);
            }
        };

        let (quick, main) = order.legs();
        self.next_position_id += 1;
        let position = Position {
            id: self.next_position_id,
            direction: plan.direction,
            entry_price: plan.entry,
            total_volume: plan.volume,
            stop_loss: plan.stop,
            quick_leg: Leg {
                id: quick_id,
                role: LegRole::Quick,
                volume: quick.volume,
                take_profit: quick.take_profit,
                active: true,
            },
            main_leg: Leg {
                id: main_id,
                role: LegRole::Main,
                volume: main.volume,
                take_profit: main.take_profit,
                active: true,
            },
            breakeven_applied: false,
            opened_at: plan.opened_at,
        };

        self.events.emit(&TradeEvent::Opened {
            position_id: position.id,
            direction: position.direction,
            entry: position.entry_price,
            stop: position.stop_loss,
            quick_tp: position.quick_leg.take_profit,
            main_tp: position.main_leg.take_profit,
            volume: position.total_volume,
        });

        self.state = PositionState::Opened(position.clone());
        Ok(position)
    }

    /// Resolve stop and target hits inside `bar`.
    ///
    /// Each leg checks its stop before its target. The quick leg, and the
    /// breakeven move it triggers, is handled first; the main leg is then
    /// judged against the stop that was in force when the bar opened.
    pub fn on_bar(&mut self, bar: &Candle) -> Vec<CompletedTrade> {
        let mut position = match std::mem::take(&mut self.state) {
            PositionState::Opened(p) | PositionState::QuickClosed(p) => p,
            other => {
                self.state = other;
                return Vec::new();
            }
        };

        let bar_stop = position.stop_loss;
        let mut closed = Vec::new();

        if position.quick_leg.active {
            let tp = position.quick_leg.take_profit;
            if let Some((price, reason)) = exit_hit(position.direction, bar_stop, tp, bar) {
                closed.extend(self.close_leg(&mut position, LegRole::Quick, price, reason, bar));
                if self.settings.move_sl_to_breakeven && !position.breakeven_applied {
                    self.apply_breakeven(&mut position);
                }
            }
        }

        if position.main_leg.active {
            let tp = position.main_leg.take_profit;
            if let Some((price, reason)) = exit_hit(position.direction, bar_stop, tp, bar) {
                closed.extend(self.close_leg(&mut position, LegRole::Main, price, reason, bar));
            }
        }

        self.state = settle(position);
        closed
    }

    pub fn force_close(&mut self, bar: &Candle) -> Vec<CompletedTrade> {
        let mut position = match std::mem::take(&mut self.state) {
            PositionState::Opened(p) | PositionState::QuickClosed(p) => p,
            other => {
                self.state = other;
                return Vec::new();
            }
        };

        let mut closed = Vec::new();
        for role in [LegRole::Quick, LegRole::Main] {
            closed.extend(self.close_leg(&mut position, role, bar.close, CloseReason::EndOfRun, bar));
        }
        self.state = settle(position);
        closed
    }

    /// Deactivate a leg and record the trade. Inactive legs are left alone.
    fn close_leg(
        &mut self,
        position: &mut Position,
        role: LegRole,
        price: f64,
        reason: CloseReason,
        bar: &Candle,
    ) -> Option<CompletedTrade> {
        let direction = position.direction;
        let entry = position.entry_price;
        let point_value = self.settings.point_value;
        let leg = position.leg_mut(role);
        if !leg.active {
            return None;
        }
        leg.active = false;
        let (leg_id, volume) = (leg.id, leg.volume);

        if let Err(ExecutionError::StaleOrMissingPosition(id)) =
            self.execution.close_leg(leg_id, reason)
        {
            self.events.emit(&TradeEvent::StaleLeg { leg: id });
        }

        let trade = CompletedTrade {
            position_id: position.id,
            role,
            direction,
            entry_price: entry,
            exit_price: price,
            entry_time: position.opened_at,
            exit_time: bar.timestamp,
            volume,
            pnl: direction.sign() * (price - entry) * volume * point_value,
            reason,
        };
        self.events.emit(&TradeEvent::LegClosed(trade.clone()));
        Some(trade)
    }

    fn apply_breakeven(&mut self, position: &mut Position) {
        if position.main_leg.active {
            if let Err(ExecutionError::StaleOrMissingPosition(id)) = self
                .execution
                .modify_stop(position.main_leg.id, position.entry_price)
            {
                self.events.emit(&TradeEvent::StaleLeg { leg: id });
            }
        }
        position.stop_loss = position.entry_price;
        position.breakeven_applied = true;
        self.events.emit(&TradeEvent::BreakevenApplied {
            position_id: position.id,
            stop: position.stop_loss,
        });
    }
}

fn settle(position: Position) -> PositionState {
    if !position.has_active_leg() {
        PositionState::Closed
    } else if position.breakeven_applied {
        PositionState::QuickClosed(position)
    } else {
        PositionState::Opened(position)
    }
}

/// Stop or target touched by the bar, stop first.
fn exit_hit(direction: Direction, stop: f64, take_profit: f64, bar: &Candle) -> Option<(f64, CloseReason)> {
    let (stop_hit, tp_hit) = match direction {
        Direction::Buy => (bar.low <= stop, bar.high >= take_profit),
        Direction::Sell => (bar.high >= stop, bar.low <= take_profit),
    };
    if stop_hit {
        Some((stop, CloseReason::StopLoss))
    } else if tp_hit {
        Some((take_profit, CloseReason::TakeProfit))
    } else {
        None
    }
}
