//! Partitions a ready set into bounded-size batch groups.
//!
//! Passes run in a fixed order and each one only sees what the previous
//! passes left over:
//! 1. Urgent tasks become individual groups.
//! 2. Exact document type, chunked by the type's optimal size.
//! 3. Quality tier, chunked by the quality batch size.
//! 4. Everything else, chunked by the mixed batch size.
//!
//! Whatever cannot reach `min_batch_size` at the end runs individually.

mod cost;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use docbatch_core::{BatchGroup, BatchStrategy, Task};
use tracing::debug;
use uuid::Uuid;

use crate::config::BatchConfig;

pub use cost::{CostModel, GroupEstimate, UNKNOWN_TYPE};

/// Quality tiers for the second grouping pass, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    /// Missing quality counts as 0.5.
    fn of(task: &Task) -> Self {
        let q = task.quality_score.unwrap_or(0.5);
        if q >= 0.8 {
            QualityTier::High
        } else if q >= 0.6 {
            QualityTier::Medium
        } else {
            QualityTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptimizer<'a> {
    config: &'a BatchConfig,
    cost: CostModel<'a>,
}

impl<'a> BatchOptimizer<'a> {
    pub fn new(config: &'a BatchConfig) -> Self {
        Self {
            config,
            cost: CostModel::new(&config.cost),
        }
    }

    /// Partition `ready` into groups. Every input task lands in exactly one
    /// group; urgent groups come first.
    pub fn optimize(&self, ready: Vec<Task>, now: DateTime<Utc>) -> Vec<BatchGroup> {
        let total = ready.len();
        let (urgent, rest): (Vec<Task>, Vec<Task>) = ready.into_iter().partition(Task::is_urgent);

        let mut groups: Vec<BatchGroup> = urgent
            .into_iter()
            .map(|task| self.individual(task, now))
            .collect();

        let rest = self.group_by_type(rest, now, &mut groups);
        let rest = self.group_by_quality(rest, now, &mut groups);
        self.group_remaining(rest, now, &mut groups);

        debug!(tasks = total, groups = groups.len(), "ready set partitioned");
        groups
    }

    fn group_by_type(&self, tasks: Vec<Task>, now: DateTime<Utc>, out: &mut Vec<BatchGroup>) -> Vec<Task> {
        let mut buckets: BTreeMap<String, Vec<Task>> = BTreeMap::new();
        let mut leftover = Vec::new();
        for task in tasks {
            match task.document_type.clone() {
                Some(doc_type) => buckets.entry(doc_type).or_default().push(task),
                None if self.config.group_unknown_type => {
                    buckets.entry(UNKNOWN_TYPE.to_string()).or_default().push(task)
                }
                None => leftover.push(task),
            }
        }

        for (doc_type, bucket) in buckets {
            if bucket.len() < self.config.min_batch_size {
                leftover.extend(bucket);
                continue;
            }
            let size = self.clamp(self.cost.optimal_batch_size(Some(doc_type.as_str())));
            leftover.extend(self.chunk(bucket, size, BatchStrategy::TypeGrouping, now, out));
        }
        sort_for_dispatch(&mut leftover);
        leftover
    }

    fn group_by_quality(&self, tasks: Vec<Task>, now: DateTime<Utc>, out: &mut Vec<BatchGroup>) -> Vec<Task> {
        let mut tiers: BTreeMap<QualityTier, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            tiers.entry(QualityTier::of(&task)).or_default().push(task);
        }

        let size = self.clamp(self.config.cost.quality_batch_size);
        let mut leftover = Vec::new();
        for tier in tiers.into_values() {
            if tier.len() < self.config.min_batch_size {
                leftover.extend(tier);
                continue;
            }
            leftover.extend(self.chunk(tier, size, BatchStrategy::QualityGrouping, now, out));
        }
        sort_for_dispatch(&mut leftover);
        leftover
    }

    fn group_remaining(&self, tasks: Vec<Task>, now: DateTime<Utc>, out: &mut Vec<BatchGroup>) {
        let stragglers = if tasks.len() >= self.config.min_batch_size {
            let size = self.clamp(self.config.cost.mixed_batch_size);
            self.chunk(tasks, size, BatchStrategy::MixedOptimization, now, out)
        } else {
            tasks
        };
        out.extend(stragglers.into_iter().map(|task| self.individual(task, now)));
    }

    /// Emit chunks of `size` while at least `min_batch_size` tasks remain.
    /// Returns the remainder.
    fn chunk(
        &self,
        mut tasks: Vec<Task>,
        size: usize,
        strategy: BatchStrategy,
        now: DateTime<Utc>,
        out: &mut Vec<BatchGroup>,
    ) -> Vec<Task> {
        while tasks.len() >= self.config.min_batch_size {
            let take = size.min(tasks.len());
            let chunk: Vec<Task> = tasks.drain(..take).collect();
            out.push(self.group(chunk, strategy, now));
        }
        tasks
    }

    fn clamp(&self, size: usize) -> usize {
        size.clamp(self.config.min_batch_size, self.config.max_batch_size)
    }

    fn individual(&self, task: Task, now: DateTime<Utc>) -> BatchGroup {
        self.group(vec![task], BatchStrategy::MixedOptimization, now)
    }

    fn group(&self, mut tasks: Vec<Task>, strategy: BatchStrategy, now: DateTime<Utc>) -> BatchGroup {
        let id = Uuid::new_v4();
        for task in &mut tasks {
            task.batch_group_id = Some(id);
        }
        let estimate = self.cost.estimate(&tasks);
        let lead_type = tasks.first().and_then(|t| t.document_type.as_deref());
        let optimal_size = self.clamp(self.cost.optimal_batch_size(lead_type));
        let target = chrono::Duration::from_std(estimate.duration).unwrap_or(chrono::Duration::zero());

        BatchGroup {
            id,
            strategy,
            optimal_size,
            estimated_total_cost: estimate.cost,
            estimated_duration: estimate.duration,
            created_at: now,
            target_completion_at: now + target,
            tasks,
        }
    }
}

fn sort_for_dispatch(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| (t.priority, t.enqueued_at));
}
