//! Pending-task queue with per-priority wait rules.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use docbatch_core::{Priority, Task, TaskId};
use tracing::debug;

use crate::config::WaitConfig;
use crate::error::BatchError;

/// Extra estimated wait per task already queued.
const WAIT_PER_QUEUED_TASK_SECS: u64 = 10;

/// Tasks submitted but not yet assigned to a batch.
///
/// Holds tasks in arrival order. Selection and removal always hand tasks
/// back ordered by `(priority, enqueued_at)`.
#[derive(Debug)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity. Tasks already queued beyond the new limit stay.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Validate and append a task. Returns its 1-based queue position.
    pub fn submit(&mut self, task: Task) -> Result<usize, BatchError> {
        task.validate()?;
        if self.tasks.len() >= self.capacity {
            return Err(BatchError::QueueFull {
                capacity: self.capacity,
            });
        }
        debug!(task_id = %task.id, priority = %task.priority, "task queued");
        self.tasks.push(task);
        Ok(self.tasks.len())
    }

    /// Put tasks back, ignoring capacity. Used for deferred groups and retries.
    pub fn requeue(&mut self, tasks: impl IntoIterator<Item = Task>) {
        for mut task in tasks {
            task.batch_group_id = None;
            self.tasks.push(task);
        }
    }

    /// Remove a pending task. `None` if it was never queued or already left.
    pub fn cancel(&mut self, id: TaskId) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    /// Tasks eligible for dispatch at `now`, without removing them.
    ///
    /// A task is ready when it is Urgent or has waited at least its
    /// priority's maximum wait. Once the queue holds `max_batch_size` tasks
    /// the whole queue is ready.
    pub fn select_ready(&self, now: DateTime<Utc>, wait: &WaitConfig, max_batch_size: usize) -> Vec<&Task> {
        let full = self.tasks.len() >= max_batch_size;
        let mut ready: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| {
                full || task.is_urgent()
                    || task.age_secs(now) >= wait.max_wait_secs(task.priority) as f64
            })
            .collect();
        ready.sort_by_key(|t| (t.priority, t.enqueued_at));
        ready
    }

    /// Remove every task whose id is in `ids`.
    pub fn remove_all(&mut self, ids: &[TaskId]) -> Vec<Task> {
        if ids.is_empty() {
            return Vec::new();
        }
        let wanted: HashSet<TaskId> = ids.iter().copied().collect();
        let (mut removed, kept): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|t| wanted.contains(&t.id));
        self.tasks = kept;
        removed.sort_by_key(|t| (t.priority, t.enqueued_at));
        removed
    }

    /// Rough wait estimate for a task of `priority` submitted now.
    pub fn estimate_wait(&self, priority: Priority) -> Duration {
        let base = match priority {
            Priority::Urgent => 0,
            Priority::High => 30,
            Priority::Normal => 90,
            Priority::Low => 180,
            Priority::BatchOnly => 300,
        };
        Duration::from_secs(base + self.tasks.len() as u64 * WAIT_PER_QUEUED_TASK_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn task(priority: Priority, enqueued_at: DateTime<Utc>) -> Task {
        Task::builder("doc.pdf")
            .priority(priority)
            .enqueued_at(enqueued_at)
            .build()
    }

    #[test]
    fn submit_reports_position() {
        let mut queue = TaskQueue::new(10);
        let now = Utc::now();
        assert_eq!(queue.submit(task(Priority::Normal, now)).unwrap(), 1);
        assert_eq!(queue.submit(task(Priority::Low, now)).unwrap(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn submit_past_capacity_fails() {
        let mut queue = TaskQueue::new(2);
        let now = Utc::now();
        queue.submit(task(Priority::Normal, now)).unwrap();
        queue.submit(task(Priority::Normal, now)).unwrap();
        let err = queue.submit(task(Priority::Normal, now)).unwrap_err();
        assert!(matches!(err, BatchError::QueueFull { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn submit_rejects_invalid_task() {
        let mut queue = TaskQueue::new(2);
        let bad = Task::builder("").build();
        assert!(matches!(queue.submit(bad), Err(BatchError::Validation(_))));
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_ignores_capacity() {
        let mut queue = TaskQueue::new(1);
        let now = Utc::now();
        queue.submit(task(Priority::Normal, now)).unwrap();
        queue.requeue(vec![task(Priority::Urgent, now), task(Priority::High, now)]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn urgent_is_always_ready() {
        let mut queue = TaskQueue::new(10);
        let now = Utc::now();
        queue.submit(task(Priority::Urgent, now)).unwrap();
        queue.submit(task(Priority::Normal, now)).unwrap();

        let ready = queue.select_ready(now, &WaitConfig::default(), 8);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].priority, Priority::Urgent);
    }

    #[test]
    fn aged_task_becomes_ready() {
        let mut queue = TaskQueue::new(10);
        let now = Utc::now();
        queue.submit(task(Priority::High, now - ChronoDuration::seconds(31))).unwrap();
        queue.submit(task(Priority::High, now - ChronoDuration::seconds(5))).unwrap();
        queue.submit(task(Priority::Low, now - ChronoDuration::seconds(299))).unwrap();

        let ready = queue.select_ready(now, &WaitConfig::default(), 8);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].priority, Priority::High);
    }

    #[test]
    fn full_queue_is_entirely_ready() {
        let mut queue = TaskQueue::new(10);
        let now = Utc::now();
        queue.submit(task(Priority::Low, now)).unwrap();
        queue.submit(task(Priority::BatchOnly, now)).unwrap();
        assert!(queue.select_ready(now, &WaitConfig::default(), 3).is_empty());

        queue.submit(task(Priority::Normal, now)).unwrap();
        let ready = queue.select_ready(now, &WaitConfig::default(), 3);
        assert_eq!(ready.len(), 3);
        assert_eq!(ready[0].priority, Priority::Normal);
        assert_eq!(ready[2].priority, Priority::BatchOnly);
    }

    #[test]
    fn selection_is_ordered_by_priority_then_age() {
        let mut queue = TaskQueue::new(10);
        let now = Utc::now();
        let old_low = task(Priority::Low, now - ChronoDuration::seconds(400));
        let newer_high = task(Priority::High, now - ChronoDuration::seconds(40));
        let older_high = task(Priority::High, now - ChronoDuration::seconds(50));
        let expected = vec![older_high.id, newer_high.id, old_low.id];
        queue.submit(old_low).unwrap();
        queue.submit(newer_high).unwrap();
        queue.submit(older_high).unwrap();

        let ready: Vec<TaskId> = queue
            .select_ready(now, &WaitConfig::default(), 8)
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ready, expected);
    }

    #[test]
    fn select_does_not_remove() {
        let mut queue = TaskQueue::new(10);
        queue.submit(task(Priority::Urgent, Utc::now())).unwrap();
        let _ = queue.select_ready(Utc::now(), &WaitConfig::default(), 8);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_all_takes_only_requested() {
        let mut queue = TaskQueue::new(10);
        let now = Utc::now();
        let a = task(Priority::Normal, now);
        let b = task(Priority::Normal, now);
        let keep = task(Priority::Normal, now);
        let ids = vec![b.id, a.id];
        let keep_id = keep.id;
        queue.submit(a).unwrap();
        queue.submit(keep).unwrap();
        queue.submit(b).unwrap();

        let removed = queue.remove_all(&ids);
        assert_eq!(removed.len(), 2);
        assert_eq!(queue.len(), 1);
        assert!(queue.iter().any(|t| t.id == keep_id));
    }

    #[test]
    fn cancel_pending_task() {
        let mut queue = TaskQueue::new(10);
        let t = task(Priority::Normal, Utc::now());
        let id = t.id;
        queue.submit(t).unwrap();

        assert_eq!(queue.cancel(id).map(|t| t.id), Some(id));
        assert!(queue.cancel(id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_estimate_grows_with_queue() {
        let mut queue = TaskQueue::new(10);
        assert_eq!(queue.estimate_wait(Priority::Urgent), Duration::ZERO);
        assert_eq!(queue.estimate_wait(Priority::Normal), Duration::from_secs(90));

        queue.submit(task(Priority::Low, Utc::now())).unwrap();
        queue.submit(task(Priority::Low, Utc::now())).unwrap();
        assert_eq!(queue.estimate_wait(Priority::High), Duration::from_secs(50));
        assert_eq!(queue.estimate_wait(Priority::BatchOnly), Duration::from_secs(320));
    }
}
