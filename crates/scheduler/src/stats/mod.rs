//! Savings statistics per dispatched group.
//!
//! The tracker owns its own lock so recording a finished group never
//! contends with the scheduler's queue lock.

mod ring;
mod snapshot;

pub use ring::RingBuffer;
pub use snapshot::{
    read_snapshot, write_snapshot, CostSample, StatsSnapshot, TimeSample, TypePerformance,
    SNAPSHOT_VERSION,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use docbatch_core::{BatchGroup, BatchStrategy, Task, TaskOutcome};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::StatsConfig;
use crate::error::BatchError;
use crate::optimizer::UNKNOWN_TYPE;

/// Savings recorded for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchSavings {
    pub cost_saved: f64,
    pub cost_savings_rate: f64,
    pub time_saved: Duration,
    pub time_savings_rate: f64,
}

/// Aggregate view reported by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub batches_processed: u64,
    pub tasks_batched: u64,
    pub tasks_processed_individually: u64,
    pub tasks_failed: u64,
    /// Mean of the most recent cost savings rates.
    pub cost_savings_rate: f64,
    /// Mean of the most recent time savings rates.
    pub time_savings_rate: f64,
    pub average_batch_size: f64,
    pub total_cost_saved: f64,
    pub total_time_saved_secs: f64,
    pub strategy_usage: BTreeMap<BatchStrategy, u64>,
    /// Share of dispatched groups per strategy, in percent.
    pub strategy_share: BTreeMap<BatchStrategy, f64>,
    pub document_types: BTreeMap<String, TypePerformance>,
}

struct Inner {
    stats: StatsSnapshot,
    config: StatsConfig,
    base_processing_secs: f64,
    dirty: bool,
}

#[derive(Clone)]
pub struct StatsTracker {
    inner: Arc<Mutex<Inner>>,
}

impl StatsTracker {
    pub fn new(config: StatsConfig, base_processing_secs: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                stats: StatsSnapshot::new(config.sample_capacity),
                config,
                base_processing_secs,
                dirty: false,
            })),
        }
    }

    /// Swap in new retention settings. Sample buffers are resized, dropping
    /// the oldest samples when they shrink.
    pub async fn reconfigure(&self, config: StatsConfig, base_processing_secs: f64) {
        let mut inner = self.inner.lock().await;
        inner.stats.set_sample_capacity(config.sample_capacity);
        inner.config = config;
        inner.base_processing_secs = base_processing_secs;
    }

    /// Record a finished group and return what it saved.
    ///
    /// `outcomes` is aligned with `group.tasks`; `None` marks a task that
    /// timed out and will be retried elsewhere. Only tasks that delivered an
    /// outcome count as processed here, and savings are scaled to them.
    pub async fn update(&self, group: &BatchGroup, outcomes: &[Option<TaskOutcome>], wall_clock: Duration) -> BatchSavings {
        let mut inner = self.inner.lock().await;
        let base_secs = inner.base_processing_secs;
        let n = group.len();
        let delivered: Vec<(&Task, &TaskOutcome)> = group
            .tasks
            .iter()
            .zip(outcomes)
            .filter_map(|(task, outcome)| outcome.as_ref().map(|o| (task, o)))
            .collect();
        let done = delivered.len();
        let stats = &mut inner.stats;

        *stats.strategy_usage.entry(group.strategy).or_default() += 1;
        stats.tasks_failed += delivered.iter().filter(|(_, o)| o.is_error()).count() as u64;

        let per_task_secs = if done == 0 { 0.0 } else { wall_clock.as_secs_f64() / done as f64 };
        for (task, outcome) in &delivered {
            let doc_type = task.document_type.as_deref().unwrap_or(UNKNOWN_TYPE);
            let perf = stats.document_types.entry(doc_type.to_string()).or_default();
            perf.record(done, per_task_secs);
            if outcome.is_success() {
                perf.succeeded += 1;
            } else {
                perf.failed += 1;
            }
        }

        let savings = if done == 0 {
            BatchSavings::default()
        } else if group.is_individual() {
            stats.tasks_processed_individually += done as u64;
            BatchSavings::default()
        } else {
            stats.batches_processed += 1;
            stats.tasks_batched += done as u64;
            stats.batch_sizes.push(done);

            let individual_cost: f64 = delivered.iter().map(|(t, _)| t.estimated_cost).sum();
            let actual_cost = group.estimated_total_cost * done as f64 / n as f64;
            let cost_saved = (individual_cost - actual_cost).max(0.0);
            let cost_savings_rate = if individual_cost > 0.0 { cost_saved / individual_cost } else { 0.0 };

            let individual_secs = done as f64 * base_secs;
            let actual_secs = wall_clock.as_secs_f64();
            let time_saved_secs = (individual_secs - actual_secs).max(0.0);
            let time_savings_rate = if individual_secs > 0.0 { time_saved_secs / individual_secs } else { 0.0 };

            stats.cost_samples.push(CostSample {
                group_id: group.id,
                estimated_individual_cost: individual_cost,
                actual_cost,
                cost_saved,
                savings_rate: cost_savings_rate,
            });
            stats.time_samples.push(TimeSample {
                group_id: group.id,
                estimated_individual_secs: individual_secs,
                actual_secs,
                time_saved_secs,
                savings_rate: time_savings_rate,
            });
            stats.total_cost_saved += cost_saved;
            stats.total_time_saved_secs += time_saved_secs;

            BatchSavings {
                cost_saved,
                cost_savings_rate,
                time_saved: Duration::from_secs_f64(time_saved_secs),
                time_savings_rate,
            }
        };
        inner.dirty = true;

        debug!(
            group_id = %group.id,
            strategy = %group.strategy,
            size = n,
            delivered = done,
            cost_saved = savings.cost_saved,
            time_saved_secs = savings.time_saved.as_secs_f64(),
            "stats updated"
        );
        savings
    }

    pub async fn summary(&self) -> StatsSummary {
        let inner = self.inner.lock().await;
        let window = inner.config.recent_window;
        let stats = &inner.stats;

        let total_usage: u64 = stats.strategy_usage.values().sum();
        let strategy_share = stats
            .strategy_usage
            .iter()
            .map(|(strategy, count)| {
                let share = if total_usage == 0 { 0.0 } else { *count as f64 * 100.0 / total_usage as f64 };
                (*strategy, share)
            })
            .collect();

        StatsSummary {
            batches_processed: stats.batches_processed,
            tasks_batched: stats.tasks_batched,
            tasks_processed_individually: stats.tasks_processed_individually,
            tasks_failed: stats.tasks_failed,
            cost_savings_rate: mean(stats.cost_samples.recent(window).map(|s| s.savings_rate)),
            time_savings_rate: mean(stats.time_samples.recent(window).map(|s| s.savings_rate)),
            average_batch_size: mean(stats.batch_sizes.iter().map(|n| *n as f64)),
            total_cost_saved: stats.total_cost_saved,
            total_time_saved_secs: stats.total_time_saved_secs,
            strategy_usage: stats.strategy_usage.clone(),
            strategy_share,
            document_types: stats.document_types.clone(),
        }
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().await.stats.clone()
    }

    /// Fold a previously persisted snapshot into the live statistics.
    pub async fn merge(&self, older: StatsSnapshot) {
        let mut inner = self.inner.lock().await;
        inner.stats.merge_older(older);
        inner.dirty = true;
    }

    /// Load and merge the snapshot at the configured path, if any.
    ///
    /// Failures are logged and leave the live statistics untouched.
    pub async fn restore(&self) -> bool {
        let Some(path) = self.inner.lock().await.config.snapshot_path.clone() else {
            return false;
        };
        let loaded = tokio::task::spawn_blocking({
            let path = path.clone();
            move || read_snapshot(&path)
        })
        .await;

        match loaded {
            Ok(Ok(Some(snapshot))) => {
                info!(path = %path.display(), batches = snapshot.batches_processed, "restored stats snapshot");
                self.merge(snapshot).await;
                true
            }
            Ok(Ok(None)) => false,
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable stats snapshot");
                false
            }
            Err(e) => {
                warn!(error = %e, "stats restore task failed");
                false
            }
        }
    }

    /// Write the snapshot if a path is configured and something changed.
    /// Returns whether a file was written.
    pub async fn persist(&self) -> Result<bool, BatchError> {
        let (path, mut snapshot) = {
            let mut inner = self.inner.lock().await;
            let Some(path) = inner.config.snapshot_path.clone() else {
                return Ok(false);
            };
            if !inner.dirty {
                return Ok(false);
            }
            inner.dirty = false;
            (path, inner.stats.clone())
        };
        snapshot.saved_at = Some(Utc::now());

        let written = tokio::task::spawn_blocking(move || write_snapshot(&path, &snapshot))
            .await
            .map_err(|e| BatchError::Io(std::io::Error::other(e.to_string())))?;
        if let Err(e) = written {
            self.inner.lock().await.dirty = true;
            return Err(e);
        }
        Ok(true)
    }

    /// [`persist`](Self::persist), logging instead of returning failures.
    pub async fn persist_logged(&self) {
        match self.persist().await {
            Ok(true) => debug!("stats snapshot persisted"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "failed to persist stats snapshot"),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
