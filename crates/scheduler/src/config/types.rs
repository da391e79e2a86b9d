use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use docbatch_core::Priority;
use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for the batch scheduler.
///
/// Parsed from `docbatch.toml` with support for `DOCBATCH_*` environment
/// variable overrides. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Smallest multi-task group the optimizer will form.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,

    /// Largest group the optimizer will form.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Groups allowed in flight at once.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Analyzer calls allowed in flight at once, across all groups.
    #[serde(default = "default_max_concurrent_analyzer_calls")]
    pub max_concurrent_analyzer_calls: usize,

    /// Pending tasks accepted before `submit` fails with `QueueFull`.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Scheduler tick period in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Deadline for a whole group run in milliseconds.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Put tasks without a document type into their own type bucket
    /// instead of leaving them to the quality pass. Off by default, so an
    /// urgent task plus four untyped ones yields one quality group of four.
    #[serde(default)]
    pub group_unknown_type: bool,

    /// Completed batches kept for status reporting.
    #[serde(default = "default_completed_history_capacity")]
    pub completed_history_capacity: usize,

    /// Completed batches older than this are pruned.
    #[serde(default = "default_completed_retention_secs")]
    pub completed_retention_secs: u64,

    #[serde(default)]
    pub wait: WaitConfig,

    #[serde(default)]
    pub cost: CostConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

fn default_min_batch_size() -> usize { 2 }
fn default_max_batch_size() -> usize { 8 }
fn default_max_concurrent_batches() -> usize { 3 }
fn default_max_concurrent_analyzer_calls() -> usize { 4 }
fn default_queue_capacity() -> usize { 1000 }
fn default_tick_interval_ms() -> u64 { 15_000 }
fn default_batch_timeout_ms() -> u64 { 60_000 }
fn default_completed_history_capacity() -> usize { 100 }
fn default_completed_retention_secs() -> u64 { 3600 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_batch_size: default_min_batch_size(),
            max_batch_size: default_max_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            max_concurrent_analyzer_calls: default_max_concurrent_analyzer_calls(),
            queue_capacity: default_queue_capacity(),
            tick_interval_ms: default_tick_interval_ms(),
            batch_timeout_ms: default_batch_timeout_ms(),
            group_unknown_type: false,
            completed_history_capacity: default_completed_history_capacity(),
            completed_retention_secs: default_completed_retention_secs(),
            wait: WaitConfig::default(),
            cost: CostConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }
}

// ── Section configs ─────────────────────────────────────────────────

/// Maximum time a task of each priority may sit in the queue before it is
/// selected regardless of batching opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default)]
    pub urgent_secs: u64,
    #[serde(default = "default_high_wait")]
    pub high_secs: u64,
    #[serde(default = "default_normal_wait")]
    pub normal_secs: u64,
    #[serde(default = "default_low_wait")]
    pub low_secs: u64,
    #[serde(default = "default_batch_only_wait")]
    pub batch_only_secs: u64,
}

fn default_high_wait() -> u64 { 30 }
fn default_normal_wait() -> u64 { 120 }
fn default_low_wait() -> u64 { 300 }
fn default_batch_only_wait() -> u64 { 600 }

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            urgent_secs: 0,
            high_secs: default_high_wait(),
            normal_secs: default_normal_wait(),
            low_secs: default_low_wait(),
            batch_only_secs: default_batch_only_wait(),
        }
    }
}

impl WaitConfig {
    pub fn max_wait_secs(&self, priority: Priority) -> u64 {
        match priority {
            Priority::Urgent => self.urgent_secs,
            Priority::High => self.high_secs,
            Priority::Normal => self.normal_secs,
            Priority::Low => self.low_secs,
            Priority::BatchOnly => self.batch_only_secs,
        }
    }
}

/// Per-document-type batching profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeProfile {
    pub optimal_batch_size: usize,
    pub cost_multiplier: f64,
}

impl TypeProfile {
    pub const fn new(optimal_batch_size: usize, cost_multiplier: f64) -> Self {
        Self {
            optimal_batch_size,
            cost_multiplier,
        }
    }
}

/// Parameters of the analyzer cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostConfig {
    /// Cost of one stand-alone analyzer call.
    #[serde(default = "default_base_cost")]
    pub base_cost: f64,
    #[serde(default = "default_preprocessing_surcharge")]
    pub preprocessing_surcharge: f64,
    #[serde(default = "default_validation_surcharge")]
    pub validation_surcharge: f64,
    /// Discount per extra group member, capped at `max_cost_discount`.
    #[serde(default = "default_cost_discount_step")]
    pub cost_discount_step: f64,
    #[serde(default = "default_max_cost_discount")]
    pub max_cost_discount: f64,
    /// Stand-alone processing time per task, in seconds.
    #[serde(default = "default_base_processing_secs")]
    pub base_processing_secs: f64,
    #[serde(default = "default_time_discount_step")]
    pub time_discount_step: f64,
    #[serde(default = "default_max_time_discount")]
    pub max_time_discount: f64,
    /// Chunk size for document types without a profile.
    #[serde(default = "default_optimal_batch_size")]
    pub default_optimal_batch_size: usize,
    /// Chunk size for quality-tier groups.
    #[serde(default = "default_quality_batch_size")]
    pub quality_batch_size: usize,
    /// Chunk size for mixed leftover groups.
    #[serde(default = "default_mixed_batch_size")]
    pub mixed_batch_size: usize,
    /// Profiles keyed by document type name. Untyped tasks use `"Unknown"`.
    #[serde(default = "default_type_profiles")]
    pub types: BTreeMap<String, TypeProfile>,
}

fn default_base_cost() -> f64 { 0.10 }
fn default_preprocessing_surcharge() -> f64 { 0.02 }
fn default_validation_surcharge() -> f64 { 0.08 }
fn default_cost_discount_step() -> f64 { 0.05 }
fn default_max_cost_discount() -> f64 { 0.25 }
fn default_base_processing_secs() -> f64 { 3.0 }
fn default_time_discount_step() -> f64 { 0.06 }
fn default_max_time_discount() -> f64 { 0.3 }
fn default_optimal_batch_size() -> usize { 5 }
fn default_quality_batch_size() -> usize { 4 }
fn default_mixed_batch_size() -> usize { 4 }

fn default_type_profiles() -> BTreeMap<String, TypeProfile> {
    [
        ("W-2", TypeProfile::new(6, 0.8)),
        ("1099-NEC", TypeProfile::new(5, 0.85)),
        ("1099-MISC", TypeProfile::new(5, 0.85)),
        ("1040", TypeProfile::new(3, 1.2)),
        ("Schedule C", TypeProfile::new(4, 1.1)),
        ("Receipt", TypeProfile::new(8, 0.7)),
        ("Invoice", TypeProfile::new(7, 0.75)),
        ("Unknown", TypeProfile::new(4, 1.0)),
    ]
    .into_iter()
    .map(|(name, profile)| (name.to_string(), profile))
    .collect()
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            base_cost: default_base_cost(),
            preprocessing_surcharge: default_preprocessing_surcharge(),
            validation_surcharge: default_validation_surcharge(),
            cost_discount_step: default_cost_discount_step(),
            max_cost_discount: default_max_cost_discount(),
            base_processing_secs: default_base_processing_secs(),
            time_discount_step: default_time_discount_step(),
            max_time_discount: default_max_time_discount(),
            default_optimal_batch_size: default_optimal_batch_size(),
            quality_batch_size: default_quality_batch_size(),
            mixed_batch_size: default_mixed_batch_size(),
            types: default_type_profiles(),
        }
    }
}

/// Statistics retention and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Where to persist the statistics snapshot. `None` disables persistence.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    /// Ring buffer capacity for cost, time, and batch-size samples.
    #[serde(default = "default_sample_capacity")]
    pub sample_capacity: usize,
    /// Samples averaged for the reported savings rates.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

fn default_snapshot_interval_secs() -> u64 { 300 }
fn default_sample_capacity() -> usize { 100 }
fn default_recent_window() -> usize { 10 }

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            snapshot_interval_secs: default_snapshot_interval_secs(),
            sample_capacity: default_sample_capacity(),
            recent_window: default_recent_window(),
        }
    }
}

impl StatsConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}
