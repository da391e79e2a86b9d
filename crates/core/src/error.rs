use thiserror::Error;

/// Reasons a task is rejected before it reaches the queue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("task is missing a source reference")]
    MissingSourceRef,

    #[error("quality score {0} is outside [0, 1]")]
    InvalidQuality(f64),

    #[error("estimated cost {0} must be a non-negative number")]
    InvalidCost(f64),
}
