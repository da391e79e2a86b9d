//! Scheduler error types.

use std::time::Duration;

use docbatch_core::{GroupId, TaskError};
use thiserror::Error;

use crate::analyzer::AnalyzerError;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid task: {0}")]
    Validation(#[from] TaskError),

    #[error("queue is full ({capacity} tasks pending)")]
    QueueFull { capacity: usize },

    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("batch {group_id} timed out after {timeout:?}")]
    Timeout { group_id: GroupId, timeout: Duration },

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported stats snapshot version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },
}
