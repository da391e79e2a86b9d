use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use docbatch_core::{Priority, Task, TaskId, TaskReport};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info};

use crate::analyzer::DocumentAnalyzer;
use crate::clock::{Clock, SystemClock};
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::executor::BatchExecutor;
use crate::optimizer::CostModel;
use crate::stats::StatsTracker;

use super::state::{QueuedTask, SchedulerState, SchedulerStatus, SubmitReceipt};

/// The batch scheduler. Queues tasks, groups ready work on each tick, and
/// runs groups against the [`DocumentAnalyzer`] within the configured
/// concurrency limits.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) config: Arc<RwLock<BatchConfig>>,
    /// Validated config waiting for the next tick.
    pub(super) pending_config: Arc<Mutex<Option<BatchConfig>>>,
    /// Queue, active batches, and completed history.
    pub(super) state: Arc<Mutex<SchedulerState>>,
    pub(super) stats: StatsTracker,
    pub(super) executor: BatchExecutor,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) reports: mpsc::UnboundedSender<TaskReport>,
    pub(super) shutdown: Arc<watch::Sender<bool>>,
    /// Signalled when urgent work arrives or retries are queued.
    pub(super) wake: Arc<Notify>,
    /// Signalled whenever a group finishes.
    pub(super) idle: Arc<Notify>,
}

impl Scheduler {
    /// Create a scheduler on the system clock. Task reports arrive on the
    /// returned receiver.
    pub fn new(
        config: BatchConfig,
        analyzer: Arc<dyn DocumentAnalyzer>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TaskReport>), BatchError> {
        Self::with_clock(config, analyzer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: BatchConfig,
        analyzer: Arc<dyn DocumentAnalyzer>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TaskReport>), BatchError> {
        config.validate()?;

        let (reports, receiver) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let stats = StatsTracker::new(config.stats.clone(), config.cost.base_processing_secs);
        let executor = BatchExecutor::new(analyzer, config.max_concurrent_analyzer_calls);
        let state = SchedulerState::new(config.queue_capacity);

        info!(
            min_batch_size = config.min_batch_size,
            max_batch_size = config.max_batch_size,
            max_concurrent_batches = config.max_concurrent_batches,
            max_concurrent_analyzer_calls = config.max_concurrent_analyzer_calls,
            queue_capacity = config.queue_capacity,
            "scheduler created"
        );

        let scheduler = Self {
            config: Arc::new(RwLock::new(config)),
            pending_config: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(state)),
            stats,
            executor,
            clock,
            reports,
            shutdown: Arc::new(shutdown),
            wake: Arc::new(Notify::new()),
            idle: Arc::new(Notify::new()),
        };
        Ok((scheduler, receiver))
    }

    /// Queue a task.
    ///
    /// The task's `enqueued_at` is set to now, and a zero `estimated_cost`
    /// is filled from the cost model. Urgent tasks wake the loop so they
    /// dispatch without waiting for the next tick.
    pub fn submit(&self, mut task: Task) -> Result<SubmitReceipt, BatchError> {
        if task.estimated_cost == 0.0 {
            task.estimated_cost = CostModel::new(&self.read_config().cost).task_cost(&task);
        }
        task.enqueued_at = self.clock.now();
        task.batch_group_id = None;
        let (task_id, priority) = (task.id, task.priority);

        let (position, estimated_wait) = {
            let mut state = self.lock_state();
            let estimated_wait = state.queue.estimate_wait(priority);
            let position = state.queue.submit(task)?;
            (position, estimated_wait)
        };

        info!(%task_id, %priority, position, "task submitted");
        if priority == Priority::Urgent {
            self.wake.notify_one();
        }

        Ok(SubmitReceipt {
            task_id,
            position,
            estimated_wait,
        })
    }

    /// Remove a task that is still queued. Returns `None` once it has been
    /// grouped or dispatched.
    pub fn cancel(&self, task_id: TaskId) -> Option<Task> {
        let cancelled = self.lock_state().queue.cancel(task_id);
        match &cancelled {
            Some(_) => info!(%task_id, "task cancelled"),
            None => debug!(%task_id, "cancel ignored, task not queued"),
        }
        cancelled
    }

    /// Validate `config` and stage it for the next tick.
    ///
    /// The analyzer permit pool keeps the size it was created with.
    pub fn apply_config(&self, config: BatchConfig) -> Result<(), BatchError> {
        config.validate()?;
        *self
            .pending_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(config);
        info!("config staged for next tick");
        Ok(())
    }

    /// Current effective config.
    pub fn config(&self) -> BatchConfig {
        self.read_config().clone()
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn pending_count(&self) -> usize {
        self.lock_state().queue.len()
    }

    pub fn active_batch_count(&self) -> usize {
        self.lock_state().active.len()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let stats = self.stats.summary().await;
        let now = self.clock.now();
        let state = self.lock_state();
        let mut queue: Vec<QueuedTask> = state
            .queue
            .iter()
            .map(|t| QueuedTask::from_task(t, now))
            .collect();
        queue.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.waiting_secs.total_cmp(&a.waiting_secs))
        });
        let mut active_batches: Vec<_> = state.active.values().cloned().collect();
        active_batches.sort_by_key(|b| b.started_at);

        SchedulerStatus {
            pending_count: state.queue.len(),
            active_batch_count: state.active.len(),
            recent_completed_count: state.completed.len(),
            peak_active_batches: state.peak_active,
            active_batches,
            recent_completed: state.completed.iter().cloned().collect(),
            stats,
            queue,
        }
    }

    pub(super) fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn read_config(&self) -> RwLockReadGuard<'_, BatchConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }
}
