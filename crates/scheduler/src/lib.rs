//! Priority-aware batch scheduler for a per-call-expensive document analyzer.
//!
//! Tasks are queued with a [`Priority`](docbatch_core::Priority), collected
//! into similarity-based groups on each tick, and run against a
//! [`DocumentAnalyzer`] under two limits: groups in flight and analyzer
//! calls in flight. Every task outcome is delivered on the report channel
//! returned by [`Scheduler::new`].

pub mod analyzer;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod optimizer;
pub mod queue;
pub mod runner;
pub mod similarity;
pub mod stats;

pub use analyzer::{AnalyzerError, DocumentAnalyzer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BatchConfig;
pub use error::BatchError;
pub use runner::{Scheduler, SchedulerStatus, SubmitReceipt, TickSummary};
pub use similarity::SimilarityReport;
pub use stats::{StatsSummary, StatsTracker};
