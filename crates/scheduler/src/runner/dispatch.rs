use std::sync::PoisonError;

use docbatch_core::{BatchGroup, ErrorKind, Priority, Task, TaskId, TaskOutcome, TaskReport};
use tracing::{debug, error, info, warn};

use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::executor::GroupRun;
use crate::optimizer::BatchOptimizer;
use crate::similarity;

use super::state::CompletedBatch;
use super::Scheduler;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tasks taken off the queue.
    pub ready: usize,
    /// Groups the optimizer formed from them.
    pub groups: usize,
    pub dispatched: usize,
    /// Groups sent back to the queue because the concurrency cap was reached.
    pub deferred: usize,
}

impl Scheduler {
    /// Run one scheduling pass.
    ///
    /// Applies staged config, prunes history, pulls the ready set, groups
    /// it, and dispatches groups until `max_concurrent_batches` are in
    /// flight. Groups over the cap go back to the queue unchanged. Must be
    /// called from within a Tokio runtime.
    pub async fn tick(&self) -> TickSummary {
        self.apply_staged_config().await;
        let config = self.config();
        let now = self.clock.now();

        let ready = {
            let mut state = self.lock_state();
            state.prune_completed(now, &config);
            let ids: Vec<TaskId> = state
                .queue
                .select_ready(now, &config.wait, config.max_batch_size)
                .iter()
                .map(|t| t.id)
                .collect();
            state.queue.remove_all(&ids)
        };

        let mut summary = TickSummary {
            ready: ready.len(),
            ..TickSummary::default()
        };
        if ready.is_empty() {
            return summary;
        }

        let groups = BatchOptimizer::new(&config).optimize(ready, now);
        summary.groups = groups.len();
        for group in groups {
            if self.try_dispatch(group, &config) {
                summary.dispatched += 1;
            } else {
                summary.deferred += 1;
            }
        }

        info!(
            ready = summary.ready,
            groups = summary.groups,
            dispatched = summary.dispatched,
            deferred = summary.deferred,
            "scheduler tick"
        );
        summary
    }

    async fn apply_staged_config(&self) {
        let staged = self
            .pending_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(config) = staged else {
            return;
        };

        self.lock_state().queue.set_capacity(config.queue_capacity);
        self.stats
            .reconfigure(config.stats.clone(), config.cost.base_processing_secs)
            .await;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        info!("staged config applied");
    }

    /// Start `group` unless the concurrency cap is reached, in which case
    /// its tasks are requeued. Returns whether it was dispatched.
    fn try_dispatch(&self, group: BatchGroup, config: &BatchConfig) -> bool {
        let report = (!group.is_individual()).then(|| similarity::analyze(&group.tasks));
        {
            let mut state = self.lock_state();
            if state.active.len() >= config.max_concurrent_batches {
                debug!(
                    group_id = %group.id,
                    size = group.len(),
                    active = state.active.len(),
                    "concurrency cap reached, deferring group"
                );
                state.queue.requeue(group.tasks);
                return false;
            }
            state.activate(&group, report.as_ref().map(|r| r.overall), self.clock.now());
        }

        info!(
            group_id = %group.id,
            strategy = %group.strategy,
            size = group.len(),
            priority = %group.priority(),
            estimated_cost = group.estimated_total_cost,
            similarity = report.as_ref().map(|r| r.overall),
            recommended = report.as_ref().map(|r| r.recommended_strategy.as_str()),
            "dispatching batch"
        );

        let this = self.clone();
        let timeout = config.batch_timeout();
        tokio::spawn(async move {
            let run = this.executor.run(group, timeout).await;
            this.finish(run, timeout).await;
        });
        true
    }

    /// Record a finished group: requeue timed-out tasks once, turn a second
    /// timeout into a terminal error, update stats and history, and deliver
    /// reports in group order. Wakes the loop when urgent work is waiting
    /// for the slot this group frees.
    async fn finish(&self, run: GroupRun, timeout: std::time::Duration) {
        let GroupRun {
            group,
            outcomes,
            elapsed,
            timed_out,
        } = run;

        let mut retries = Vec::new();
        let outcomes: Vec<Option<TaskOutcome>> = group
            .tasks
            .iter()
            .zip(outcomes)
            .map(|(task, outcome)| match outcome {
                Some(outcome) => Some(outcome),
                None if !task.is_retry() => {
                    warn!(task_id = %task.id, group_id = %group.id, "task timed out, retrying as urgent");
                    retries.push(retry_of(task));
                    None
                }
                None => {
                    error!(task_id = %task.id, group_id = %group.id, attempt = task.attempt, "task timed out again, giving up");
                    let err = BatchError::Timeout {
                        group_id: group.id,
                        timeout,
                    };
                    Some(TaskOutcome::error(ErrorKind::Timeout, err.to_string()))
                }
            })
            .collect();

        let savings = self.stats.update(&group, &outcomes, elapsed).await;

        let succeeded = outcomes.iter().flatten().filter(|o| o.is_success()).count();
        let failed = outcomes.iter().flatten().filter(|o| o.is_error()).count();
        let retried = retries.len();
        let config = self.config();
        let urgent_waiting = {
            let mut state = self.lock_state();
            state.queue.requeue(retries);
            state.record_completed(
                CompletedBatch {
                    group_id: group.id,
                    strategy: group.strategy,
                    size: group.len(),
                    succeeded,
                    failed,
                    retried,
                    duration: elapsed,
                    completed_at: self.clock.now(),
                },
                config.completed_history_capacity,
            );
            let urgent = state.queue.iter().any(Task::is_urgent);
            urgent
        };

        for (task, outcome) in group.tasks.iter().zip(outcomes) {
            let Some(outcome) = outcome else {
                continue;
            };
            let report = TaskReport {
                task_id: task.id,
                source_ref: task.source_ref.clone(),
                batch_group_id: group.id,
                strategy: group.strategy,
                batch_size: group.len(),
                priority: task.priority,
                attempt: task.attempt,
                outcome,
            };
            if self.reports.send(report).is_err() {
                debug!(task_id = %task.id, "report receiver dropped");
            }
        }

        info!(
            group_id = %group.id,
            strategy = %group.strategy,
            size = group.len(),
            succeeded,
            failed,
            retried,
            timed_out,
            elapsed_ms = elapsed.as_millis() as u64,
            cost_saved = savings.cost_saved,
            "batch finished"
        );

        if urgent_waiting {
            self.wake.notify_one();
        }
        self.idle.notify_waiters();
    }
}

/// A timed-out task re-entering the queue as an individual urgent retry.
fn retry_of(task: &Task) -> Task {
    let mut retry = task.clone();
    retry.priority = Priority::Urgent;
    retry.attempt += 1;
    retry.batch_group_id = None;
    retry
}
