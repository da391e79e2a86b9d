//! Durable statistics snapshot.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docbatch_core::{BatchStrategy, GroupId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ring::RingBuffer;
use crate::error::BatchError;

/// Version written to, and required from, snapshot files.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSample {
    pub group_id: GroupId,
    pub estimated_individual_cost: f64,
    pub actual_cost: f64,
    pub cost_saved: f64,
    pub savings_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSample {
    pub group_id: GroupId,
    pub estimated_individual_secs: f64,
    pub actual_secs: f64,
    pub time_saved_secs: f64,
    pub savings_rate: f64,
}

/// Running per-document-type aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypePerformance {
    pub tasks: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Mean size of the groups these tasks ran in.
    pub mean_batch_size: f64,
    /// Mean wall-clock seconds per task.
    pub mean_task_secs: f64,
}

impl TypePerformance {
    pub(super) fn record(&mut self, batch_size: usize, task_secs: f64) {
        self.tasks += 1;
        let n = self.tasks as f64;
        self.mean_batch_size += (batch_size as f64 - self.mean_batch_size) / n;
        self.mean_task_secs += (task_secs - self.mean_task_secs) / n;
    }

    fn merge(&mut self, other: &TypePerformance) {
        let total = self.tasks + other.tasks;
        if total == 0 {
            return;
        }
        let (a, b, t) = (self.tasks as f64, other.tasks as f64, total as f64);
        self.mean_batch_size = (self.mean_batch_size * a + other.mean_batch_size * b) / t;
        self.mean_task_secs = (self.mean_task_secs * a + other.mean_task_secs * b) / t;
        self.tasks = total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Everything the stats tracker knows, in persistable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub version: u32,
    pub batches_processed: u64,
    pub tasks_batched: u64,
    pub tasks_processed_individually: u64,
    pub tasks_failed: u64,
    pub strategy_usage: BTreeMap<BatchStrategy, u64>,
    pub cost_samples: RingBuffer<CostSample>,
    pub time_samples: RingBuffer<TimeSample>,
    pub batch_sizes: RingBuffer<usize>,
    pub document_types: BTreeMap<String, TypePerformance>,
    pub total_cost_saved: f64,
    pub total_time_saved_secs: f64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    pub fn new(sample_capacity: usize) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            batches_processed: 0,
            tasks_batched: 0,
            tasks_processed_individually: 0,
            tasks_failed: 0,
            strategy_usage: BTreeMap::new(),
            cost_samples: RingBuffer::new(sample_capacity),
            time_samples: RingBuffer::new(sample_capacity),
            batch_sizes: RingBuffer::new(sample_capacity),
            document_types: BTreeMap::new(),
            total_cost_saved: 0.0,
            total_time_saved_secs: 0.0,
            saved_at: None,
        }
    }

    pub fn set_sample_capacity(&mut self, capacity: usize) {
        self.cost_samples.set_capacity(capacity);
        self.time_samples.set_capacity(capacity);
        self.batch_sizes.set_capacity(capacity);
    }

    /// Fold an older snapshot into this one.
    ///
    /// Counters are summed. Samples from `older` go before ours and the
    /// buffers keep only the newest entries that fit.
    pub fn merge_older(&mut self, older: StatsSnapshot) {
        self.batches_processed += older.batches_processed;
        self.tasks_batched += older.tasks_batched;
        self.tasks_processed_individually += older.tasks_processed_individually;
        self.tasks_failed += older.tasks_failed;
        self.total_cost_saved += older.total_cost_saved;
        self.total_time_saved_secs += older.total_time_saved_secs;

        for (strategy, count) in older.strategy_usage {
            *self.strategy_usage.entry(strategy).or_default() += count;
        }
        for (doc_type, perf) in &older.document_types {
            self.document_types.entry(doc_type.clone()).or_default().merge(perf);
        }

        self.cost_samples.absorb_older(older.cost_samples.iter().cloned());
        self.time_samples.absorb_older(older.time_samples.iter().cloned());
        self.batch_sizes.absorb_older(older.batch_sizes.iter().copied());
    }
}

/// Write `snapshot` to `path` atomically (temp file in the same directory,
/// fsync, then rename).
pub fn write_snapshot(path: &Path, snapshot: &StatsSnapshot) -> Result<(), BatchError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let json = serde_json::to_vec_pretty(snapshot)?;
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), bytes = json.len(), "stats snapshot written");
    Ok(())
}

/// Read a snapshot. `Ok(None)` when the file does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<StatsSnapshot>, BatchError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read(path)?;

    let probe: VersionProbe = serde_json::from_slice(&content)?;
    if probe.version != SNAPSHOT_VERSION {
        return Err(BatchError::SnapshotVersion {
            found: probe.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok(Some(serde_json::from_slice(&content)?))
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stats".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
