use super::types::BatchConfig;
use crate::error::BatchError;

impl BatchConfig {
    /// Validate bounds and cost-model parameters.
    pub fn validate(&self) -> Result<(), BatchError> {
        self.validate_batch_bounds()?;
        self.validate_concurrency()?;
        self.validate_cost_model()?;
        self.validate_stats()?;
        Ok(())
    }

    fn validate_batch_bounds(&self) -> Result<(), BatchError> {
        if self.min_batch_size < 2 {
            return Err(BatchError::Config(format!(
                "min_batch_size must be at least 2, got {}",
                self.min_batch_size
            )));
        }
        if self.max_batch_size < self.min_batch_size {
            return Err(BatchError::Config(format!(
                "max_batch_size ({}) is smaller than min_batch_size ({})",
                self.max_batch_size, self.min_batch_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(BatchError::Config("queue_capacity must be positive".into()));
        }
        Ok(())
    }

    fn validate_concurrency(&self) -> Result<(), BatchError> {
        if self.max_concurrent_batches == 0 {
            return Err(BatchError::Config(
                "max_concurrent_batches must be positive".into(),
            ));
        }
        if self.max_concurrent_analyzer_calls == 0 {
            return Err(BatchError::Config(
                "max_concurrent_analyzer_calls must be positive".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(BatchError::Config("tick_interval_ms must be positive".into()));
        }
        if self.batch_timeout_ms == 0 {
            return Err(BatchError::Config("batch_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    fn validate_cost_model(&self) -> Result<(), BatchError> {
        let cost = &self.cost;
        let rates = [
            ("base_cost", cost.base_cost),
            ("preprocessing_surcharge", cost.preprocessing_surcharge),
            ("validation_surcharge", cost.validation_surcharge),
            ("cost_discount_step", cost.cost_discount_step),
            ("base_processing_secs", cost.base_processing_secs),
            ("time_discount_step", cost.time_discount_step),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(BatchError::Config(format!(
                    "cost.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("max_cost_discount", cost.max_cost_discount),
            ("max_time_discount", cost.max_time_discount),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(BatchError::Config(format!(
                    "cost.{name} must be in [0, 1), got {value}"
                )));
            }
        }
        for (doc_type, profile) in &cost.types {
            if profile.optimal_batch_size == 0 {
                return Err(BatchError::Config(format!(
                    "cost.types.'{doc_type}' optimal_batch_size must be positive"
                )));
            }
            if !profile.cost_multiplier.is_finite() || profile.cost_multiplier <= 0.0 {
                return Err(BatchError::Config(format!(
                    "cost.types.'{doc_type}' cost_multiplier must be positive, got {}",
                    profile.cost_multiplier
                )));
            }
        }
        Ok(())
    }

    fn validate_stats(&self) -> Result<(), BatchError> {
        if self.stats.sample_capacity == 0 {
            return Err(BatchError::Config("stats.sample_capacity must be positive".into()));
        }
        if self.stats.recent_window == 0 {
            return Err(BatchError::Config("stats.recent_window must be positive".into()));
        }
        Ok(())
    }
}
