//! Work queue error types.
//!
//! Two classes live here: setup errors that abort a run before any worker
//! starts, and delegate errors that a worker reports for a single item.

use thiserror::Error;

use crate::repository::StoreError;

/// Errors that prevent a pipeline run from starting.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline has no stages")]
    NoStages,
    #[error("Nothing to do: every seed source is empty")]
    NoWork,
    #[error("Stage '{stage}' has {count} workers (must be between 1 and {max})")]
    InvalidWorkerCount {
        stage: String,
        count: usize,
        max: usize,
    },
    #[error("{given} seed lists given for a pipeline with {stages} stages")]
    TooManySeedLists { given: usize, stages: usize },
    #[error("Datastore error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors a stage delegate reports for one work item.
///
/// Only [`DelegateError::RateLimited`] and [`DelegateError::QuotaExceeded`]
/// are fatal; everything else drops the item and the worker moves on.
#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("External tool failed: {0}")]
    ExternalTool(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Datastore error: {0}")]
    Store(#[from] StoreError),
}

impl DelegateError {
    /// Whether this error should trip the run's fatal guard.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DelegateError::RateLimited(_) | DelegateError::QuotaExceeded(_)
        )
    }
}

impl From<reqwest::Error> for DelegateError {
    fn from(e: reqwest::Error) -> Self {
        DelegateError::Http(e.to_string())
    }
}
