use std::path::{Path, PathBuf};

use docbatch_core::config::{env_opt, override_from_env};

use super::types::BatchConfig;
use crate::error::BatchError;

impl BatchConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, BatchError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus env overrides, for running without a config file.
    pub fn from_env() -> Result<Self, BatchError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override individual fields from `DOCBATCH_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        override_from_env(&mut self.min_batch_size, "MIN_BATCH_SIZE");
        override_from_env(&mut self.max_batch_size, "MAX_BATCH_SIZE");
        override_from_env(&mut self.max_concurrent_batches, "MAX_CONCURRENT_BATCHES");
        override_from_env(
            &mut self.max_concurrent_analyzer_calls,
            "MAX_CONCURRENT_ANALYZER_CALLS",
        );
        override_from_env(&mut self.queue_capacity, "QUEUE_CAPACITY");
        override_from_env(&mut self.tick_interval_ms, "TICK_INTERVAL_MS");
        override_from_env(&mut self.batch_timeout_ms, "BATCH_TIMEOUT_MS");
        override_from_env(&mut self.group_unknown_type, "GROUP_UNKNOWN_TYPE");
        override_from_env(&mut self.stats.snapshot_interval_secs, "STATS_SNAPSHOT_INTERVAL_SECS");

        if let Some(path) = env_opt("STATS_SNAPSHOT_PATH") {
            self.stats.snapshot_path = Some(PathBuf::from(path));
        }
    }
}
