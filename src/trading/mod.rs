pub mod events;
pub mod execution;
pub mod trade_manager;
pub mod trade_record;

pub use events::{EventSink, LogEventSink, TradeEvent};
pub use execution::{ExecutionSink, SimulatedExecution};
pub use trade_manager::{DualOrderTradeManager, EntryPlan, PositionState, TradeManagerSettings};
pub use trade_record::{CloseReason, CompletedTrade, EquityPoint, LegRole};
