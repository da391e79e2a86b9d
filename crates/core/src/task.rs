use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify;
use crate::error::TaskError;

/// Unique identifier for a submitted task.
pub type TaskId = Uuid;

/// Latency class of a task. Lower variants preempt higher ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Dispatched alone on the next tick, never merged.
    Urgent = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    /// Only worth running as part of a full batch.
    BatchOnly = 4,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::BatchOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::BatchOnly => "batch_only",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single document waiting to be analyzed.
///
/// Tasks are created by callers, owned by the queue while pending, and moved
/// into exactly one [`BatchGroup`](crate::BatchGroup) once the scheduler
/// selects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Opaque handle the analyzer uses to locate the document.
    pub source_ref: String,
    #[serde(default)]
    pub document_type: Option<String>,
    /// Scan quality estimate in [0, 1].
    #[serde(default)]
    pub quality_score: Option<f64>,
    /// Client the document belongs to, also passed to the analyzer as a hint.
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub preprocessing_required: bool,
    #[serde(default)]
    pub validation_recommended: bool,
    /// Cost of analyzing this task on its own. Zero means "not yet estimated".
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub batch_group_id: Option<Uuid>,
    /// 0 on first run, incremented when a timed-out task is retried.
    #[serde(default)]
    pub attempt: u32,
}

fn default_true() -> bool {
    true
}

impl Task {
    /// Start building a task for the given source reference.
    pub fn builder(source_ref: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(source_ref)
    }

    /// Check the fields the scheduler relies on.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.source_ref.trim().is_empty() {
            return Err(TaskError::MissingSourceRef);
        }
        if let Some(q) = self.quality_score {
            if !q.is_finite() || !(0.0..=1.0).contains(&q) {
                return Err(TaskError::InvalidQuality(q));
            }
        }
        if !self.estimated_cost.is_finite() || self.estimated_cost < 0.0 {
            return Err(TaskError::InvalidCost(self.estimated_cost));
        }
        Ok(())
    }

    /// Seconds since the task entered the queue, clamped at zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        let age = now.signed_duration_since(self.enqueued_at);
        (age.num_milliseconds().max(0) as f64) / 1000.0
    }

    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }

    /// Whether this task is already a timeout retry.
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// Fluent builder for [`Task`].
///
/// ```
/// use docbatch_core::{Priority, Task};
///
/// let task = Task::builder("uploads/w2_2024.pdf")
///     .priority(Priority::High)
///     .infer_from_filename()
///     .build();
///
/// assert_eq!(task.document_type.as_deref(), Some("W-2"));
/// ```
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(source_ref: impl Into<String>) -> Self {
        Self {
            task: Task {
                id: Uuid::new_v4(),
                source_ref: source_ref.into(),
                document_type: None,
                quality_score: None,
                client_key: None,
                priority: Priority::Normal,
                preprocessing_required: true,
                validation_recommended: false,
                estimated_cost: 0.0,
                enqueued_at: Utc::now(),
                batch_group_id: None,
                attempt: 0,
            },
        }
    }

    pub fn id(mut self, id: TaskId) -> Self {
        self.task.id = id;
        self
    }

    pub fn document_type(mut self, document_type: impl Into<String>) -> Self {
        self.task.document_type = Some(document_type.into());
        self
    }

    pub fn quality_score(mut self, score: f64) -> Self {
        self.task.quality_score = Some(score);
        self
    }

    pub fn client_key(mut self, client_key: impl Into<String>) -> Self {
        self.task.client_key = Some(client_key.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn preprocessing_required(mut self, required: bool) -> Self {
        self.task.preprocessing_required = required;
        self
    }

    pub fn validation_recommended(mut self, recommended: bool) -> Self {
        self.task.validation_recommended = recommended;
        self
    }

    pub fn estimated_cost(mut self, cost: f64) -> Self {
        self.task.estimated_cost = cost;
        self
    }

    pub fn enqueued_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.enqueued_at = at;
        self
    }

    /// Quick preliminary analysis from the source reference's file name.
    ///
    /// Fills `document_type` when it is unset and a pattern matches, then
    /// recommends validation for urgent or structurally complex documents.
    pub fn infer_from_filename(mut self) -> Self {
        if self.task.document_type.is_none() {
            self.task.document_type =
                classify::predict_document_type(&self.task.source_ref).map(str::to_string);
        }
        if classify::recommends_validation(self.task.priority, self.task.document_type.as_deref()) {
            self.task.validation_recommended = true;
        }
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}
