use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{Priority, Task, TaskId};

/// Unique identifier for a batch group.
pub type GroupId = Uuid;

/// Why a set of tasks was grouped together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStrategy {
    TypeGrouping,
    QualityGrouping,
    ClientGrouping,
    RequirementGrouping,
    MixedOptimization,
}

impl BatchStrategy {
    pub const ALL: [BatchStrategy; 5] = [
        BatchStrategy::TypeGrouping,
        BatchStrategy::QualityGrouping,
        BatchStrategy::ClientGrouping,
        BatchStrategy::RequirementGrouping,
        BatchStrategy::MixedOptimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStrategy::TypeGrouping => "type_grouping",
            BatchStrategy::QualityGrouping => "quality_grouping",
            BatchStrategy::ClientGrouping => "client_grouping",
            BatchStrategy::RequirementGrouping => "requirement_grouping",
            BatchStrategy::MixedOptimization => "mixed_optimization",
        }
    }
}

impl fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of tasks dispatched to the analyzer together.
///
/// Size stays within the configured `[min, max]` batch bounds, except for
/// individual groups which always hold exactly one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchGroup {
    pub id: GroupId,
    pub strategy: BatchStrategy,
    pub tasks: Vec<Task>,
    /// Discounted cost of running all tasks as one batch.
    pub estimated_total_cost: f64,
    /// Discounted wall-clock estimate for the whole group.
    pub estimated_duration: Duration,
    /// Preferred chunk size for the leading task's document type.
    pub optimal_size: usize,
    pub created_at: DateTime<Utc>,
    pub target_completion_at: DateTime<Utc>,
}

impl BatchGroup {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Single-task group: urgent work, retries, or leftovers.
    pub fn is_individual(&self) -> bool {
        self.tasks.len() == 1
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    /// Highest (most urgent) priority among member tasks.
    pub fn priority(&self) -> Priority {
        self.tasks
            .iter()
            .map(|t| t.priority)
            .min()
            .unwrap_or_default()
    }

    /// Sum of the tasks' stand-alone cost estimates.
    pub fn individual_cost(&self) -> f64 {
        self.tasks.iter().map(|t| t.estimated_cost).sum()
    }
}
