//! Runs one batch group against the analyzer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use docbatch_core::{BatchGroup, ErrorKind, TaskOutcome};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::analyzer::DocumentAnalyzer;
use crate::error::BatchError;

/// Result of one group run.
#[derive(Debug)]
pub struct GroupRun {
    pub group: BatchGroup,
    /// One slot per task in group order. `None` means the task had not
    /// produced a result when the group deadline passed.
    pub outcomes: Vec<Option<TaskOutcome>>,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl GroupRun {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_some()).count()
    }
}

/// Dispatches tasks to the analyzer through a shared permit pool.
///
/// The pool is shared across all groups, so the number of concurrent
/// analyzer calls stays bounded however many groups are in flight.
#[derive(Clone)]
pub struct BatchExecutor {
    analyzer: Arc<dyn DocumentAnalyzer>,
    permits: Arc<Semaphore>,
}

impl BatchExecutor {
    pub fn new(analyzer: Arc<dyn DocumentAnalyzer>, max_concurrent_calls: usize) -> Self {
        Self {
            analyzer,
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Analyze every task in `group`, giving up on stragglers after `timeout`.
    ///
    /// Each task runs in its own spawned task, so an analyzer error or panic
    /// only affects that task's outcome. Stragglers are aborted at the
    /// deadline.
    pub async fn run(&self, group: BatchGroup, timeout: Duration) -> GroupRun {
        let started = Instant::now();
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; group.tasks.len()];
        let mut handles = Vec::with_capacity(group.tasks.len());
        let mut pending = FuturesUnordered::new();

        for (idx, task) in group.tasks.iter().enumerate() {
            let analyzer = Arc::clone(&self.analyzer);
            let permits = Arc::clone(&self.permits);
            let source_ref = task.source_ref.clone();
            let client_hint = task.client_key.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return TaskOutcome::error(ErrorKind::Analyzer, "analyzer permit pool closed");
                };
                match analyzer.process_one(&source_ref, client_hint.as_deref()).await {
                    Ok(analysis) => TaskOutcome::Success(analysis),
                    Err(e) => TaskOutcome::error(ErrorKind::Analyzer, BatchError::from(e).to_string()),
                }
            });
            handles.push(handle.abort_handle());
            pending.push(async move { (idx, handle.await) });
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((idx, Ok(outcome))) => outcomes[idx] = Some(outcome),
                    Some((idx, Err(join_err))) => {
                        let task_id = group.tasks[idx].id;
                        let outcome = if join_err.is_panic() {
                            warn!(group_id = %group.id, %task_id, "analyzer panicked");
                            TaskOutcome::error(ErrorKind::Panicked, format!("analyzer panicked: {join_err}"))
                        } else {
                            TaskOutcome::error(ErrorKind::Analyzer, format!("analyzer call cancelled: {join_err}"))
                        };
                        outcomes[idx] = Some(outcome);
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            for handle in &handles {
                handle.abort();
            }
        }

        let run = GroupRun {
            group,
            outcomes,
            elapsed: started.elapsed(),
            timed_out,
        };
        if run.timed_out {
            warn!(
                group_id = %run.group.id,
                delivered = run.delivered(),
                size = run.group.len(),
                ?timeout,
                "batch timed out"
            );
        }
        debug!(group_id = %run.group.id, elapsed = ?run.elapsed, "group run finished");
        run
    }
}
