//! Batch scheduler runner.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, submission, cancellation, status
//! - `state`: shared queue/active/history state and the types `status()` reports
//! - `dispatch`: one scheduling tick and group completion handling
//! - `execution`: the background loop and shutdown

mod core;
mod dispatch;
mod execution;
mod state;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
pub use self::dispatch::TickSummary;
pub use self::state::{
    ActiveBatch, CompletedBatch, QueuedTask, SchedulerStatus, SubmitReceipt,
};
