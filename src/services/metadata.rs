//! Metadata resolution pipeline.
//!
//! `retrieve -> save`. Each retrieve call resolves one batch of up to 50
//! identifiers through the remote API; every resulting record is saved by
//! a much wider pool of save workers.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::normalize_all;
use super::youtube_api::{item_id, parse_video, MetadataSource};
use crate::config::{MAX_METADATA_BATCH, MAX_SAVE_WORKERS};
use crate::models::{PendingStage, VideoRecord};
use crate::repository::VideoStore;
use crate::utils::normalize_video_id;
use crate::work_queue::{
    DelegateError, EngineOptions, Pipeline, PipelineError, PipelineEvent, PipelineReport, Routed,
    StageConfig, StageDelegate,
};

pub const RETRIEVE: usize = 0;
pub const SAVE: usize = 1;

pub const STAGE_NAMES: [&str; 2] = ["retrieve", "save"];

/// Payload flowing through the metadata pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataItem {
    Batch(Vec<String>),
    Record(Box<VideoRecord>),
}

impl fmt::Display for MetadataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataItem::Batch(ids) => match ids.first() {
                Some(first) if ids.len() > 1 => {
                    write!(f, "batch of {} ({}..)", ids.len(), first)
                }
                Some(first) => write!(f, "batch of 1 ({})", first),
                None => write!(f, "empty batch"),
            },
            MetadataItem::Record(record) => write!(f, "{}", record.video_id),
        }
    }
}

/// Save-stage width for a given number of retrieve workers.
pub fn save_workers_for(retrieve_workers: usize) -> usize {
    retrieve_workers
        .saturating_mul(MAX_METADATA_BATCH)
        .clamp(1, MAX_SAVE_WORKERS)
}

struct RetrieveDelegate {
    source: Arc<dyn MetadataSource>,
    store: Arc<dyn VideoStore>,
}

#[async_trait]
impl StageDelegate<MetadataItem> for RetrieveDelegate {
    async fn process(
        &self,
        item: MetadataItem,
    ) -> Result<Vec<Routed<MetadataItem>>, DelegateError> {
        let ids = match item {
            MetadataItem::Batch(ids) => ids,
            record @ MetadataItem::Record(_) => return Ok(vec![Routed::to(SAVE, record)]),
        };
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = self.source.fetch_videos(&ids).await?;

        let mut returned = HashSet::new();
        let mut failed = Vec::new();
        let mut routed = Vec::with_capacity(items.len());

        for raw in items {
            let id = item_id(&raw).map(str::to_string);
            if let Some(ref id) = id {
                returned.insert(id.clone());
            }
            match parse_video(raw) {
                Ok(record) => routed.push(Routed::to(SAVE, MetadataItem::Record(Box::new(record)))),
                Err(e) => {
                    warn!(
                        "Skipping unusable item {}: {}",
                        id.as_deref().unwrap_or("?"),
                        e
                    );
                    failed.extend(id);
                }
            }
        }

        failed.extend(ids.iter().filter(|id| !returned.contains(*id)).cloned());

        if !failed.is_empty() {
            info!(
                "{} of {} ids could not be resolved; marking failed",
                failed.len(),
                ids.len()
            );
            debug!("Failed metadata ids: {:?}", failed);
            self.store
                .mark_failed(PendingStage::Metadata, &failed)
                .await?;
        }

        Ok(routed)
    }
}

struct SaveDelegate {
    store: Arc<dyn VideoStore>,
}

#[async_trait]
impl StageDelegate<MetadataItem> for SaveDelegate {
    async fn process(
        &self,
        item: MetadataItem,
    ) -> Result<Vec<Routed<MetadataItem>>, DelegateError> {
        match item {
            MetadataItem::Record(record) => {
                self.store.upsert_record(&record).await?;
                debug!("Saved metadata for {}", record.video_id);
                Ok(Vec::new())
            }
            batch @ MetadataItem::Batch(_) => Err(DelegateError::Malformed(format!(
                "{} reached the save stage unresolved",
                batch
            ))),
        }
    }
}

/// Builds and runs the metadata pipeline.
pub struct MetadataService {
    source: Arc<dyn MetadataSource>,
    store: Arc<dyn VideoStore>,
    workers: usize,
    batch_size: usize,
    seed_limit: usize,
    options: EngineOptions,
}

impl MetadataService {
    pub fn new(source: Arc<dyn MetadataSource>, store: Arc<dyn VideoStore>) -> Self {
        Self {
            source,
            store,
            workers: 2,
            batch_size: MAX_METADATA_BATCH,
            seed_limit: 5000,
            options: EngineOptions::default(),
        }
    }

    /// Retrieve workers; the save stage is sized from this.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.clamp(1, MAX_METADATA_BATCH);
        self
    }

    /// Upper bound on ids pulled from the store when none are given.
    pub fn seed_limit(mut self, limit: usize) -> Self {
        self.seed_limit = limit;
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Identifiers to resolve: explicit ones (persisted first), else pending ones.
    async fn collect_ids(&self, explicit: &[String]) -> Result<Vec<String>, PipelineError> {
        if explicit.is_empty() {
            let ids = self
                .store
                .fetch_pending(PendingStage::Metadata, self.seed_limit)
                .await?;
            info!("Loaded {} ids pending metadata", ids.len());
            return Ok(ids);
        }

        let ids = normalize_all(explicit, normalize_video_id, "video id");
        let inserted = self.store.seed_pending(&ids).await?;
        info!("Using {} explicit ids ({} new)", ids.len(), inserted);
        Ok(ids)
    }

    pub async fn run(
        &self,
        explicit_ids: &[String],
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> Result<PipelineReport, PipelineError> {
        let max = self.options.max_workers_per_stage;
        if self.workers == 0 || self.workers > max {
            return Err(PipelineError::InvalidWorkerCount {
                stage: STAGE_NAMES[RETRIEVE].to_string(),
                count: self.workers,
                max,
            });
        }

        let ids = self.collect_ids(explicit_ids).await?;
        let batches: Vec<MetadataItem> = ids
            .chunks(self.batch_size)
            .map(|chunk| MetadataItem::Batch(chunk.to_vec()))
            .collect();

        // The save stage is sized from the retrieve stage and may exceed
        // the configured per-stage cap.
        let save_workers = save_workers_for(self.workers);
        let mut options = self.options.clone();
        options.max_workers_per_stage = options.max_workers_per_stage.max(save_workers);

        let mut pipeline = Pipeline::new("metadata")
            .stage(
                StageConfig::new(
                    STAGE_NAMES[RETRIEVE],
                    self.workers,
                    Arc::new(RetrieveDelegate {
                        source: Arc::clone(&self.source),
                        store: Arc::clone(&self.store),
                    }),
                )
                .guarded(),
            )
            .stage(StageConfig::new(
                STAGE_NAMES[SAVE],
                save_workers,
                Arc::new(SaveDelegate {
                    store: Arc::clone(&self.store),
                }),
            ))
            .options(options);
        if let Some(tx) = events {
            pipeline = pipeline.events(tx);
        }

        info!(
            "Resolving metadata for {} ids in {} batches ({} retrieve, {} save workers)",
            ids.len(),
            batches.len(),
            self.workers,
            save_workers
        );
        pipeline.run(vec![batches]).await
    }
}
