use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::batch::{BatchStrategy, GroupId};
use crate::task::{Priority, TaskId};

/// What the analyzer returns for a successfully processed document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub document_type: Option<String>,
    pub confidence: Option<f64>,
    /// Extracted fields. The scheduler never interprets these.
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Category of a per-task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The analyzer returned an error.
    Analyzer,
    /// The analyzer call panicked.
    Panicked,
    /// The task timed out on its retry as well.
    Timeout,
}

/// Result of analyzing one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(Analysis),
    Error { kind: ErrorKind, message: String },
}

impl TaskOutcome {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        TaskOutcome::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }
}

/// A task outcome tagged with the batch it ran in, as delivered to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub source_ref: String,
    pub batch_group_id: GroupId,
    pub strategy: BatchStrategy,
    pub batch_size: usize,
    pub priority: Priority,
    pub attempt: u32,
    pub outcome: TaskOutcome,
}
