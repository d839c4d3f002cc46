//! In-memory [`VideoStore`] for tests and dry runs.
//!
//! Pending identifiers come back in insertion order rather than random
//! order, which keeps test expectations deterministic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::StoreError;
use super::store::{StoreCounts, VideoStore};
use crate::models::{FileRef, PendingStage, VideoRecord};

#[derive(Debug, Default, Clone)]
struct IdEntry {
    failed_metadata: bool,
    failed_file: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    order: Vec<String>,
    ids: HashMap<String, IdEntry>,
    records: HashMap<String, VideoRecord>,
    files: HashMap<String, FileRef>,
    upserts: usize,
}

#[derive(Debug, Default)]
pub struct MemoryVideoStore {
    state: RwLock<MemoryState>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, video_id: &str) -> Option<VideoRecord> {
        self.state.read().await.records.get(video_id).cloned()
    }

    pub async fn file_ref(&self, video_id: &str) -> Option<FileRef> {
        self.state.read().await.files.get(video_id).cloned()
    }

    /// All known identifiers, in the order they were first seeded.
    pub async fn ids(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    /// Identifiers currently marked failed for `stage`, in seed order.
    pub async fn failed(&self, stage: PendingStage) -> Vec<String> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter(|id| {
                state.ids.get(*id).is_some_and(|e| match stage {
                    PendingStage::Metadata => e.failed_metadata,
                    PendingStage::File => e.failed_file,
                })
            })
            .cloned()
            .collect()
    }

    /// Number of successful `upsert_record` calls.
    pub async fn upsert_count(&self) -> usize {
        self.state.read().await.upserts
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn seed_pending(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let mut inserted = 0;
        for id in ids {
            if !state.ids.contains_key(id) {
                state.ids.insert(id.clone(), IdEntry::default());
                state.order.push(id.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn fetch_pending(
        &self,
        stage: PendingStage,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let pending = state
            .order
            .iter()
            .filter(|id| {
                let Some(entry) = state.ids.get(*id) else {
                    return false;
                };
                match stage {
                    PendingStage::Metadata => {
                        !entry.failed_metadata && !state.records.contains_key(*id)
                    }
                    PendingStage::File => {
                        !entry.failed_file
                            && state.records.contains_key(*id)
                            && !state.files.contains_key(*id)
                    }
                }
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(pending)
    }

    async fn mark_failed(&self, stage: PendingStage, ids: &[String]) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(entry) = state.ids.get_mut(id) {
                match stage {
                    PendingStage::Metadata => entry.failed_metadata = true,
                    PendingStage::File => entry.failed_file = true,
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn reset_failed(&self, stage: PendingStage) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let mut cleared = 0;
        for entry in state.ids.values_mut() {
            let flag = match stage {
                PendingStage::Metadata => &mut entry.failed_metadata,
                PendingStage::File => &mut entry.failed_file,
            };
            if *flag {
                *flag = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn upsert_record(&self, record: &VideoRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .records
            .insert(record.video_id.clone(), record.clone());
        state.upserts += 1;
        Ok(())
    }

    async fn upsert_file_ref(&self, file: &FileRef) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.files.insert(file.video_id.clone(), file.clone());
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let state = self.state.read().await;
        Ok(StoreCounts {
            ids: state.ids.len() as u64,
            with_metadata: state.records.len() as u64,
            failed_metadata: state.ids.values().filter(|e| e.failed_metadata).count() as u64,
            with_file: state.files.len() as u64,
            failed_file: state.ids.values().filter(|e| e.failed_file).count() as u64,
        })
    }
}
