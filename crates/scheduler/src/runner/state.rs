use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use docbatch_core::{BatchGroup, BatchStrategy, GroupId, Priority, Task, TaskId};
use serde::Serialize;

use crate::config::BatchConfig;
use crate::queue::TaskQueue;
use crate::stats::StatsSummary;

/// Returned by `submit`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    /// 1-based position in the pending queue at submission.
    pub position: usize,
    pub estimated_wait: Duration,
}

/// A group currently running against the analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveBatch {
    pub group_id: GroupId,
    pub strategy: BatchStrategy,
    pub size: usize,
    pub started_at: DateTime<Utc>,
    /// Overall similarity of the group's tasks; `None` for single tasks.
    pub similarity: Option<f64>,
}

/// History entry for a finished group.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedBatch {
    pub group_id: GroupId,
    pub strategy: BatchStrategy,
    pub size: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks sent back to the queue after a timeout.
    pub retried: usize,
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
}

/// A pending task as shown in status output.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedTask {
    pub task_id: TaskId,
    pub source_ref: String,
    pub priority: Priority,
    pub document_type: Option<String>,
    pub estimated_cost: f64,
    pub attempt: u32,
    pub waiting_secs: f64,
}

impl QueuedTask {
    pub(super) fn from_task(task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            source_ref: task.source_ref.clone(),
            priority: task.priority,
            document_type: task.document_type.clone(),
            estimated_cost: task.estimated_cost,
            attempt: task.attempt,
            waiting_secs: task.age_secs(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub pending_count: usize,
    pub active_batch_count: usize,
    pub recent_completed_count: usize,
    /// Most groups observed in flight at once since start.
    pub peak_active_batches: usize,
    pub active_batches: Vec<ActiveBatch>,
    pub recent_completed: Vec<CompletedBatch>,
    pub stats: StatsSummary,
    pub queue: Vec<QueuedTask>,
}

/// Everything behind the scheduler's single state lock.
#[derive(Debug)]
pub(super) struct SchedulerState {
    pub(super) queue: TaskQueue,
    pub(super) active: HashMap<GroupId, ActiveBatch>,
    pub(super) completed: VecDeque<CompletedBatch>,
    pub(super) peak_active: usize,
}

impl SchedulerState {
    pub(super) fn new(queue_capacity: usize) -> Self {
        Self {
            queue: TaskQueue::new(queue_capacity),
            active: HashMap::new(),
            completed: VecDeque::new(),
            peak_active: 0,
        }
    }

    pub(super) fn activate(&mut self, group: &BatchGroup, similarity: Option<f64>, now: DateTime<Utc>) {
        self.active.insert(
            group.id,
            ActiveBatch {
                group_id: group.id,
                strategy: group.strategy,
                size: group.len(),
                started_at: now,
                similarity,
            },
        );
        self.peak_active = self.peak_active.max(self.active.len());
    }

    pub(super) fn record_completed(&mut self, entry: CompletedBatch, capacity: usize) {
        self.active.remove(&entry.group_id);
        self.completed.push_back(entry);
        while self.completed.len() > capacity {
            self.completed.pop_front();
        }
    }

    /// Drop history older than the retention window and beyond capacity.
    pub(super) fn prune_completed(&mut self, now: DateTime<Utc>, config: &BatchConfig) {
        let retention = chrono::Duration::from_std(config.completed_retention())
            .unwrap_or(chrono::Duration::MAX);
        if let Some(cutoff) = now.checked_sub_signed(retention) {
            self.completed.retain(|c| c.completed_at >= cutoff);
        }
        while self.completed.len() > config.completed_history_capacity {
            self.completed.pop_front();
        }
    }
}
