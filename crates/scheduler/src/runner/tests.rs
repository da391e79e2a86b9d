use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use docbatch_core::{Analysis, BatchStrategy, ErrorKind, Priority, Task, TaskOutcome, TaskReport};
use tokio::sync::{mpsc, watch};

use crate::analyzer::{AnalyzerError, DocumentAnalyzer};
use crate::clock::ManualClock;
use crate::config::BatchConfig;
use crate::error::BatchError;

use super::Scheduler;

/// Mock analyzer. Source refs starting with `fail` error, `hang` never
/// finish, and everything waits for the gate to open first.
struct MockAnalyzer {
    gate: watch::Sender<bool>,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    fn open() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            gate,
            calls: AtomicUsize::new(0),
        })
    }

    fn closed() -> Arc<Self> {
        let (gate, _) = watch::channel(false);
        Arc::new(Self {
            gate,
            calls: AtomicUsize::new(0),
        })
    }

    fn release(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl DocumentAnalyzer for MockAnalyzer {
    async fn process_one(&self, source_ref: &str, client_hint: Option<&str>) -> Result<Analysis, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if source_ref.starts_with("fail") {
            return Err(AnalyzerError::Failed(format!("cannot read {source_ref}")));
        }
        if source_ref.starts_with("hang") {
            std::future::pending::<()>().await;
        }
        let mut fields = std::collections::BTreeMap::new();
        if let Some(client) = client_hint {
            fields.insert("client".to_string(), serde_json::json!(client));
        }
        Ok(Analysis {
            document_type: Some("W-2".into()),
            confidence: Some(0.95),
            fields,
        })
    }
}

fn setup(
    config: BatchConfig,
    analyzer: Arc<MockAnalyzer>,
) -> (Scheduler, mpsc::UnboundedReceiver<TaskReport>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (scheduler, reports) = Scheduler::with_clock(config, analyzer, clock.clone()).unwrap();
    (scheduler, reports, clock)
}

async fn recv(reports: &mut mpsc::UnboundedReceiver<TaskReport>, n: usize) -> Vec<TaskReport> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .expect("timed out waiting for reports")
            .expect("report channel closed");
        out.push(report);
    }
    out
}

async fn wait_until_idle(scheduler: &Scheduler) {
    assert!(scheduler.drain(Duration::from_secs(5)).await, "scheduler never went idle");
}

fn w2(name: &str, priority: Priority) -> Task {
    Task::builder(name).document_type("W-2").priority(priority).build()
}

#[tokio::test]
async fn urgent_task_dispatches_alone() {
    let (scheduler, mut reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    scheduler.submit(w2("now.pdf", Priority::Urgent)).unwrap();
    scheduler.submit(w2("later.pdf", Priority::Normal)).unwrap();

    let tick = scheduler.tick().await;
    assert_eq!(tick.ready, 1);
    assert_eq!(tick.dispatched, 1);

    let report = &recv(&mut reports, 1).await[0];
    assert_eq!(report.source_ref, "now.pdf");
    assert_eq!(report.batch_size, 1);
    assert!(report.outcome.is_success());
    assert_eq!(scheduler.pending_count(), 1);
}

#[tokio::test]
async fn six_w2_run_as_one_type_batch() {
    let (scheduler, mut reports, clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    for i in 0..6 {
        scheduler.submit(w2(&format!("w2-{i}.pdf"), Priority::Normal)).unwrap();
    }

    assert_eq!(scheduler.tick().await.ready, 0, "not due yet");
    clock.advance(Duration::from_secs(121));
    let tick = scheduler.tick().await;
    assert_eq!(tick.groups, 1);

    let got = recv(&mut reports, 6).await;
    let group_id = got[0].batch_group_id;
    assert!(got.iter().all(|r| r.batch_group_id == group_id));
    assert!(got.iter().all(|r| r.strategy == BatchStrategy::TypeGrouping && r.batch_size == 6));

    wait_until_idle(&scheduler).await;
    let status = scheduler.status().await;
    assert_eq!(status.stats.batches_processed, 1);
    assert_eq!(status.stats.tasks_batched, 6);
    assert!(status.stats.total_cost_saved > 0.0);
    assert_eq!(status.recent_completed_count, 1);
}

#[tokio::test]
async fn full_queue_rejects_submission() {
    let config = BatchConfig {
        queue_capacity: 2,
        ..BatchConfig::default()
    };
    let (scheduler, _reports, _clock) = setup(config, MockAnalyzer::open());
    scheduler.submit(w2("a.pdf", Priority::Low)).unwrap();
    scheduler.submit(w2("b.pdf", Priority::Low)).unwrap();

    let err = scheduler.submit(w2("c.pdf", Priority::Low)).unwrap_err();
    assert!(matches!(err, BatchError::QueueFull { capacity: 2 }));
    assert_eq!(scheduler.pending_count(), 2);
}

#[tokio::test]
async fn invalid_task_is_rejected() {
    let (scheduler, _reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    let err = scheduler.submit(Task::builder(" ").build()).unwrap_err();
    assert!(matches!(err, BatchError::Validation(_)));
}

#[tokio::test]
async fn errors_are_isolated_and_ordered() {
    let (scheduler, mut reports, clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    for name in ["ok-1.pdf", "fail-2.pdf", "ok-3.pdf"] {
        scheduler.submit(w2(name, Priority::High)).unwrap();
    }
    clock.advance(Duration::from_secs(31));
    scheduler.tick().await;

    let got = recv(&mut reports, 3).await;
    let refs: Vec<&str> = got.iter().map(|r| r.source_ref.as_str()).collect();
    assert_eq!(refs, vec!["ok-1.pdf", "fail-2.pdf", "ok-3.pdf"]);
    assert!(got[0].outcome.is_success());
    assert!(matches!(
        &got[1].outcome,
        TaskOutcome::Error { kind: ErrorKind::Analyzer, message }
            if message.starts_with("analyzer error:") && message.contains("fail-2.pdf")
    ));
    assert!(got[2].outcome.is_success());

    wait_until_idle(&scheduler).await;
    assert_eq!(scheduler.status().await.stats.tasks_failed, 1);
}

#[tokio::test]
async fn groups_over_cap_are_requeued() {
    let config = BatchConfig {
        max_concurrent_batches: 1,
        ..BatchConfig::default()
    };
    let analyzer = MockAnalyzer::closed();
    let (scheduler, mut reports, _clock) = setup(config, analyzer.clone());
    scheduler.submit(w2("u1.pdf", Priority::Urgent)).unwrap();
    scheduler.submit(w2("u2.pdf", Priority::Urgent)).unwrap();

    let tick = scheduler.tick().await;
    assert_eq!(tick.dispatched, 1);
    assert_eq!(tick.deferred, 1);
    assert_eq!(scheduler.pending_count(), 1);
    assert_eq!(scheduler.active_batch_count(), 1);

    // Still capped while the first group is blocked.
    assert_eq!(scheduler.tick().await.deferred, 1);

    analyzer.release();
    recv(&mut reports, 1).await;
    wait_until_idle(&scheduler).await;

    assert_eq!(scheduler.tick().await.dispatched, 1);
    recv(&mut reports, 1).await;
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.status().await.peak_active_batches, 1);
}

#[tokio::test]
async fn timeout_retries_once_then_fails() {
    let config = BatchConfig {
        batch_timeout_ms: 100,
        ..BatchConfig::default()
    };
    let (scheduler, mut reports, _clock) = setup(config, MockAnalyzer::open());
    let receipt = scheduler.submit(w2("hang.pdf", Priority::Urgent)).unwrap();

    scheduler.tick().await;
    wait_until_idle(&scheduler).await;

    let status = scheduler.status().await;
    assert_eq!(status.pending_count, 1, "timed-out task is requeued");
    assert_eq!(status.queue[0].priority, Priority::Urgent);
    assert_eq!(status.queue[0].attempt, 1);
    assert_eq!(status.recent_completed[0].retried, 1);
    assert!(reports.try_recv().is_err(), "no report for a retried task");

    scheduler.tick().await;
    let report = &recv(&mut reports, 1).await[0];
    assert_eq!(report.task_id, receipt.task_id);
    assert_eq!(report.attempt, 1);
    assert!(matches!(
        &report.outcome,
        TaskOutcome::Error { kind: ErrorKind::Timeout, message } if message.contains("timed out")
    ));

    wait_until_idle(&scheduler).await;
    assert_eq!(scheduler.pending_count(), 0);
}

#[tokio::test]
async fn timed_out_batch_delivers_finished_tasks() {
    let config = BatchConfig {
        batch_timeout_ms: 200,
        ..BatchConfig::default()
    };
    let (scheduler, mut reports, clock) = setup(config, MockAnalyzer::open());
    scheduler.submit(w2("ok.pdf", Priority::High)).unwrap();
    scheduler.submit(w2("hang.pdf", Priority::High)).unwrap();
    clock.advance(Duration::from_secs(31));

    scheduler.tick().await;
    let got = recv(&mut reports, 1).await;
    assert_eq!(got[0].source_ref, "ok.pdf");
    assert_eq!(got[0].batch_size, 2);

    wait_until_idle(&scheduler).await;
    let status = scheduler.status().await;
    assert_eq!(status.pending_count, 1);
    assert_eq!(status.queue[0].source_ref, "hang.pdf");

    // Only the delivered task counts, and savings cover just that task:
    // 0.10 stand-alone against half of the 0.19 group estimate.
    assert_eq!(status.stats.batches_processed, 1);
    assert_eq!(status.stats.tasks_batched, 1);
    assert_eq!(status.stats.tasks_processed_individually, 0);
    assert!((status.stats.total_cost_saved - 0.005).abs() < 1e-9);
    assert_eq!(status.stats.document_types["W-2"].tasks, 1);

    scheduler.tick().await;
    let retry = &recv(&mut reports, 1).await[0];
    assert_eq!(retry.source_ref, "hang.pdf");
    wait_until_idle(&scheduler).await;

    let stats = scheduler.status().await.stats;
    assert_eq!(stats.tasks_batched + stats.tasks_processed_individually, 2);
}

#[tokio::test]
async fn cancel_only_while_queued() {
    let (scheduler, mut reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    let queued = scheduler.submit(w2("a.pdf", Priority::Low)).unwrap();
    let urgent = scheduler.submit(w2("b.pdf", Priority::Urgent)).unwrap();

    assert!(scheduler.cancel(queued.task_id).is_some());
    assert!(scheduler.cancel(queued.task_id).is_none());

    scheduler.tick().await;
    recv(&mut reports, 1).await;
    assert!(scheduler.cancel(urgent.task_id).is_none());
    assert_eq!(scheduler.pending_count(), 0);
}

#[tokio::test]
async fn receipt_reports_position_and_wait() {
    let (scheduler, _reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    let first = scheduler.submit(w2("a.pdf", Priority::Normal)).unwrap();
    let second = scheduler.submit(w2("b.pdf", Priority::High)).unwrap();

    assert_eq!(first.position, 1);
    assert_eq!(first.estimated_wait, Duration::from_secs(90));
    assert_eq!(second.position, 2);
    assert_eq!(second.estimated_wait, Duration::from_secs(40));
}

#[tokio::test]
async fn zero_cost_is_filled_at_submit() {
    let (scheduler, _reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    scheduler.submit(w2("a.pdf", Priority::Low)).unwrap();
    scheduler
        .submit(Task::builder("b.pdf").estimated_cost(0.5).priority(Priority::BatchOnly).build())
        .unwrap();

    let status = scheduler.status().await;
    let low = status.queue.iter().find(|t| t.priority == Priority::Low).unwrap();
    assert!((low.estimated_cost - 0.10).abs() < 1e-9, "W-2 0.08 + preprocessing 0.02");
    let batch_only = status.queue.iter().find(|t| t.priority == Priority::BatchOnly).unwrap();
    assert_eq!(batch_only.estimated_cost, 0.5);
}

#[tokio::test]
async fn staged_config_applies_on_next_tick() {
    let (scheduler, _reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    let smaller = BatchConfig {
        queue_capacity: 1,
        ..BatchConfig::default()
    };
    scheduler.apply_config(smaller).unwrap();

    scheduler.submit(w2("a.pdf", Priority::Low)).unwrap();
    scheduler.submit(w2("b.pdf", Priority::Low)).unwrap();
    assert_eq!(scheduler.config().queue_capacity, 1000);

    scheduler.tick().await;
    assert_eq!(scheduler.config().queue_capacity, 1);
    assert!(matches!(
        scheduler.submit(w2("c.pdf", Priority::Low)),
        Err(BatchError::QueueFull { capacity: 1 })
    ));
}

#[tokio::test]
async fn staged_config_resizes_stats_retention() {
    let (scheduler, mut reports, clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    let mut config = BatchConfig::default();
    config.stats.sample_capacity = 1;
    scheduler.apply_config(config).unwrap();

    for round in 0..2 {
        scheduler.submit(w2(&format!("a-{round}.pdf"), Priority::High)).unwrap();
        scheduler.submit(w2(&format!("b-{round}.pdf"), Priority::High)).unwrap();
        clock.advance(Duration::from_secs(31));
        assert_eq!(scheduler.tick().await.dispatched, 1);
        recv(&mut reports, 2).await;
        wait_until_idle(&scheduler).await;
    }

    let snapshot = scheduler.stats().snapshot().await;
    assert_eq!(snapshot.batches_processed, 2);
    assert_eq!(snapshot.cost_samples.capacity(), 1);
    assert_eq!(snapshot.cost_samples.len(), 1);
    assert_eq!(snapshot.batch_sizes.len(), 1);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let (scheduler, _reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    let bad = BatchConfig {
        max_batch_size: 1,
        ..BatchConfig::default()
    };
    assert!(matches!(scheduler.apply_config(bad), Err(BatchError::Config(_))));
    assert!(Scheduler::new(
        BatchConfig {
            max_concurrent_batches: 0,
            ..BatchConfig::default()
        },
        MockAnalyzer::open()
    )
    .is_err());
}

#[tokio::test]
async fn completed_history_is_pruned_by_age() {
    let config = BatchConfig {
        completed_retention_secs: 60,
        ..BatchConfig::default()
    };
    let (scheduler, mut reports, clock) = setup(config, MockAnalyzer::open());
    scheduler.submit(w2("a.pdf", Priority::Urgent)).unwrap();
    scheduler.tick().await;
    recv(&mut reports, 1).await;
    wait_until_idle(&scheduler).await;
    assert_eq!(scheduler.status().await.recent_completed_count, 1);

    clock.advance(Duration::from_secs(61));
    scheduler.tick().await;
    assert_eq!(scheduler.status().await.recent_completed_count, 0);
}

#[tokio::test]
async fn client_hint_reaches_analyzer() {
    let (scheduler, mut reports, _clock) = setup(BatchConfig::default(), MockAnalyzer::open());
    let task = Task::builder("w2.pdf")
        .priority(Priority::Urgent)
        .client_key("acme")
        .build();
    scheduler.submit(task).unwrap();
    scheduler.tick().await;

    let report = &recv(&mut reports, 1).await[0];
    match &report.outcome {
        TaskOutcome::Success(analysis) => assert_eq!(analysis.fields["client"], "acme"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn run_loop_dispatches_and_stops() {
    let config = BatchConfig {
        tick_interval_ms: 20,
        ..BatchConfig::default()
    };
    let analyzer = MockAnalyzer::open();
    let (scheduler, mut reports) = Scheduler::new(config, analyzer.clone()).unwrap();
    let handle = scheduler.spawn();

    scheduler.submit(w2("a.pdf", Priority::Urgent)).unwrap();
    scheduler.submit(w2("b.pdf", Priority::Urgent)).unwrap();
    recv(&mut reports, 2).await;

    scheduler.shutdown();
    assert!(scheduler.is_shutting_down());
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run loop did not stop")
        .unwrap();
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn deferred_urgent_task_runs_when_a_slot_frees() {
    let config = BatchConfig {
        max_concurrent_batches: 1,
        tick_interval_ms: 60_000,
        ..BatchConfig::default()
    };
    let analyzer = MockAnalyzer::closed();
    let (scheduler, mut reports) = Scheduler::new(config, analyzer.clone()).unwrap();
    let handle = scheduler.spawn();

    scheduler.submit(w2("u1.pdf", Priority::Urgent)).unwrap();
    scheduler.submit(w2("u2.pdf", Priority::Urgent)).unwrap();

    // Wait until the loop has dispatched one group and deferred the other.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while scheduler.active_batch_count() != 1 || scheduler.pending_count() != 1 {
        assert!(tokio::time::Instant::now() < deadline, "loop never hit the cap");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Far sooner than the next tick: the finished group wakes the loop.
    analyzer.release();
    let got = recv(&mut reports, 2).await;
    let mut refs: Vec<&str> = got.iter().map(|r| r.source_ref.as_str()).collect();
    refs.sort();
    assert_eq!(refs, vec!["u1.pdf", "u2.pdf"]);

    scheduler.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run loop did not stop")
        .unwrap();
}
