//! Analyzer cost and duration model.

use std::time::Duration;

use docbatch_core::Task;

use crate::config::CostConfig;

/// Profile key for tasks without a document type.
pub const UNKNOWN_TYPE: &str = "Unknown";

/// Cost and time estimates derived from a [`CostConfig`].
#[derive(Debug, Clone, Copy)]
pub struct CostModel<'a> {
    config: &'a CostConfig,
}

/// Estimate for running a set of tasks as one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupEstimate {
    pub cost: f64,
    pub duration: Duration,
}

impl<'a> CostModel<'a> {
    pub fn new(config: &'a CostConfig) -> Self {
        Self { config }
    }

    /// Undiscounted cost of analyzing `task` on its own.
    pub fn task_cost(&self, task: &Task) -> f64 {
        let mut cost = self.config.base_cost * self.cost_multiplier(task.document_type.as_deref());
        if task.preprocessing_required {
            cost += self.config.preprocessing_surcharge;
        }
        if task.validation_recommended {
            cost += self.config.validation_surcharge;
        }
        cost
    }

    pub fn cost_multiplier(&self, document_type: Option<&str>) -> f64 {
        self.config
            .types
            .get(document_type.unwrap_or(UNKNOWN_TYPE))
            .map(|p| p.cost_multiplier)
            .unwrap_or(1.0)
    }

    /// Preferred chunk size for a document type, before clamping.
    pub fn optimal_batch_size(&self, document_type: Option<&str>) -> usize {
        self.config
            .types
            .get(document_type.unwrap_or(UNKNOWN_TYPE))
            .map(|p| p.optimal_batch_size)
            .unwrap_or(self.config.default_optimal_batch_size)
    }

    /// Fractional cost discount for a group of `n` tasks.
    pub fn cost_discount(&self, n: usize) -> f64 {
        if n <= 1 {
            return 0.0;
        }
        ((n - 1) as f64 * self.config.cost_discount_step).min(self.config.max_cost_discount)
    }

    /// Fractional time discount for a group of `n` tasks.
    pub fn time_discount(&self, n: usize) -> f64 {
        if n <= 1 {
            return 0.0;
        }
        ((n - 1) as f64 * self.config.time_discount_step).min(self.config.max_time_discount)
    }

    /// Time to process `n` tasks one by one.
    pub fn individual_duration(&self, n: usize) -> Duration {
        Duration::from_secs_f64(n as f64 * self.config.base_processing_secs)
    }

    /// Discounted cost and duration of running `tasks` together.
    ///
    /// Always priced from the model; a caller-supplied `estimated_cost` is
    /// only the stand-alone baseline that savings are measured against.
    pub fn estimate(&self, tasks: &[Task]) -> GroupEstimate {
        let n = tasks.len();
        let individual: f64 = tasks.iter().map(|t| self.task_cost(t)).sum();
        GroupEstimate {
            cost: individual * (1.0 - self.cost_discount(n)),
            duration: self.individual_duration(n).mul_f64(1.0 - self.time_discount(n)),
        }
    }
}
