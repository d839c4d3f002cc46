//! Datastore operations used by the pipelines.

use async_trait::async_trait;

use super::error::StoreError;
use crate::models::{FileRef, PendingStage, VideoRecord};

/// Row counts for the `status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub ids: u64,
    pub with_metadata: u64,
    pub failed_metadata: u64,
    pub with_file: u64,
    pub failed_file: u64,
}

/// Persistence for identifiers, metadata records and file references.
///
/// Every write is idempotent: calling it twice with the same arguments
/// leaves the store in the same state as calling it once.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Record identifiers as pending. Returns how many were new.
    async fn seed_pending(&self, ids: &[String]) -> Result<usize, StoreError>;

    /// Identifiers still waiting on `stage`, skipping ones marked failed.
    async fn fetch_pending(
        &self,
        stage: PendingStage,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Mark identifiers as failed for `stage` so later runs skip them.
    async fn mark_failed(&self, stage: PendingStage, ids: &[String]) -> Result<usize, StoreError>;

    /// Clear every failed flag for `stage`. Returns how many were cleared.
    async fn reset_failed(&self, stage: PendingStage) -> Result<usize, StoreError>;

    /// Insert or replace a metadata record and its child rows.
    async fn upsert_record(&self, record: &VideoRecord) -> Result<(), StoreError>;

    /// Insert or replace the file reference for a video.
    async fn upsert_file_ref(&self, file: &FileRef) -> Result<(), StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;
}
