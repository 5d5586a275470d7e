pub mod report;
pub mod runner;
pub mod store;

pub use report::{BacktestReport, PerformanceMetrics};
pub use runner::{BacktestResult, BacktestSimulator, RunCounters};
pub use store::RunArtifacts;
