//! The external document analyzer the scheduler dispatches tasks to.

use async_trait::async_trait;
use docbatch_core::Analysis;
use thiserror::Error;

/// Failure reported by a [`DocumentAnalyzer`] for a single document.
#[derive(Debug, Clone, Error)]
pub enum AnalyzerError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("analyzer rate limited")]
    RateLimited,

    #[error("analysis failed: {0}")]
    Failed(String),
}

/// Analyzes one document at a time.
///
/// Implementations must be safe to call concurrently; the scheduler bounds
/// the number of in-flight calls itself.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyze the document behind `source_ref`. `client_hint` is the task's
    /// client key when one was given.
    async fn process_one(
        &self,
        source_ref: &str,
        client_hint: Option<&str>,
    ) -> Result<Analysis, AnalyzerError>;
}
