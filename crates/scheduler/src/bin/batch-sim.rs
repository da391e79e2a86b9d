//! batch-sim: drives the scheduler against a simulated analyzer.
//!
//! Reads tasks as JSON lines (or generates a synthetic mix), submits them,
//! prints every task report as a JSON line, then prints the final status.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use docbatch_core::config::load_dotenv;
use docbatch_core::{classify, Analysis, Priority, Task};
use docbatch_scheduler::{AnalyzerError, BatchConfig, BatchError, DocumentAnalyzer, Scheduler};

// ── CLI ─────────────────────────────────────────────────────────────

/// Simulate batch scheduling of document analysis.
#[derive(Parser, Debug)]
#[command(name = "batch-sim", version, about)]
struct Cli {
    /// Path to docbatch.toml. Defaults plus DOCBATCH_* env overrides when omitted.
    #[arg(long, env = "DOCBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-lines task file. A synthetic mix is generated when omitted.
    #[arg(long)]
    tasks: Option<PathBuf>,

    /// Number of synthetic tasks to generate.
    #[arg(long, default_value_t = 40)]
    generate: usize,

    /// Simulated analyzer latency per document, in milliseconds.
    #[arg(long, default_value_t = 50)]
    latency_ms: u64,

    /// Fraction of analyzer calls that fail, in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Override the scheduler tick interval, in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Give up waiting for reports after this many seconds.
    #[arg(long, default_value_t = 300)]
    max_runtime_secs: u64,
}

// ── Input ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TaskInput {
    source_ref: String,
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    quality_score: Option<f64>,
    #[serde(default)]
    client_key: Option<String>,
    #[serde(default)]
    priority: Priority,
}

impl TaskInput {
    fn into_task(self) -> Task {
        let mut builder = Task::builder(self.source_ref).priority(self.priority);
        if let Some(doc_type) = self.document_type {
            builder = builder.document_type(doc_type);
        }
        if let Some(quality) = self.quality_score {
            builder = builder.quality_score(quality);
        }
        if let Some(client) = self.client_key {
            builder = builder.client_key(client);
        }
        builder.infer_from_filename().build()
    }
}

fn read_tasks(path: &Path) -> anyhow::Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading task file {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let input: TaskInput = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid task", path.display(), idx + 1))?;
            Ok(input.into_task())
        })
        .collect()
}

fn synthetic_tasks(count: usize) -> Vec<Task> {
    const NAMES: [&str; 6] = ["w2", "1099-nec", "1040", "receipt", "invoice", "scan"];
    const PRIORITIES: [Priority; 5] = [
        Priority::Normal,
        Priority::High,
        Priority::Low,
        Priority::Normal,
        Priority::BatchOnly,
    ];
    const CLIENTS: [&str; 3] = ["acme", "globex", "initech"];

    (0..count)
        .map(|i| {
            let priority = if i % 17 == 0 {
                Priority::Urgent
            } else {
                PRIORITIES[i % PRIORITIES.len()]
            };
            Task::builder(format!("uploads/{}_{i:04}.pdf", NAMES[i % NAMES.len()]))
                .priority(priority)
                .quality_score(0.35 + ((i * 37) % 60) as f64 / 100.0)
                .client_key(CLIENTS[i % CLIENTS.len()])
                .infer_from_filename()
                .build()
        })
        .collect()
}

// ── SimulatedAnalyzer ───────────────────────────────────────────────

/// Sleeps for a fixed latency and fails a deterministic share of calls.
struct SimulatedAnalyzer {
    latency: Duration,
    failure_rate: f64,
    calls: AtomicU64,
}

impl SimulatedAnalyzer {
    fn should_fail(&self, call: u64) -> bool {
        let before = (call as f64 * self.failure_rate).floor();
        let after = ((call + 1) as f64 * self.failure_rate).floor();
        after > before
    }
}

#[async_trait]
impl DocumentAnalyzer for SimulatedAnalyzer {
    async fn process_one(&self, source_ref: &str, client_hint: Option<&str>) -> Result<Analysis, AnalyzerError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        if self.should_fail(call) {
            return Err(AnalyzerError::Failed(format!("simulated failure for {source_ref}")));
        }

        let mut analysis = Analysis {
            document_type: classify::predict_document_type(source_ref).map(str::to_string),
            confidence: Some(0.9),
            ..Analysis::default()
        };
        if let Some(client) = client_hint {
            analysis
                .fields
                .insert("client".to_string(), serde_json::Value::from(client));
        }
        Ok(analysis)
    }
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&cli.failure_rate),
        "--failure-rate must be in [0, 1], got {}",
        cli.failure_rate
    );

    let mut config = match &cli.config {
        Some(path) => {
            let cfg = BatchConfig::from_file(path)?;
            info!(path = %path.display(), "loaded scheduler config");
            cfg
        }
        None => BatchConfig::from_env()?,
    };
    if let Some(tick_ms) = cli.tick_ms {
        config.tick_interval_ms = tick_ms;
        config.validate()?;
    }

    let tasks = match &cli.tasks {
        Some(path) => read_tasks(path)?,
        None => synthetic_tasks(cli.generate),
    };

    let analyzer = Arc::new(SimulatedAnalyzer {
        latency: Duration::from_millis(cli.latency_ms),
        failure_rate: cli.failure_rate,
        calls: AtomicU64::new(0),
    });
    let (scheduler, mut reports) = Scheduler::new(config, analyzer)?;
    let handle = scheduler.spawn();

    let mut accepted = 0usize;
    for task in tasks {
        match scheduler.submit(task) {
            Ok(_) => accepted += 1,
            Err(e @ (BatchError::QueueFull { .. } | BatchError::Validation(_))) => {
                warn!(error = %e, "task not accepted");
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(accepted, "tasks submitted");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.max_runtime_secs);
    let mut received = 0usize;
    while received < accepted {
        match tokio::time::timeout_at(deadline, reports.recv()).await {
            Ok(Some(report)) => {
                println!("{}", serde_json::to_string(&report)?);
                received += 1;
            }
            Ok(None) => break,
            Err(_) => {
                warn!(received, accepted, "max runtime reached before all reports arrived");
                break;
            }
        }
    }

    scheduler.shutdown();
    handle.await?;

    let status = scheduler.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
