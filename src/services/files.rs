//! File resolution pipeline.
//!
//! A single guarded `download` stage: fetch the media for one id and store
//! a reference to the local file.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::normalize_all;
use super::ytdlp::FileFetcher;
use crate::models::{FileRef, PendingStage};
use crate::repository::VideoStore;
use crate::utils::normalize_video_id;
use crate::work_queue::{
    DelegateError, EngineOptions, Pipeline, PipelineError, PipelineEvent, PipelineReport, Routed,
    StageConfig, StageDelegate,
};

pub const STAGE_NAME: &str = "download";

struct DownloadDelegate {
    fetcher: Arc<dyn FileFetcher>,
    store: Arc<dyn VideoStore>,
}

#[async_trait]
impl StageDelegate<String> for DownloadDelegate {
    async fn process(&self, video_id: String) -> Result<Vec<Routed<String>>, DelegateError> {
        match self.fetcher.fetch(&video_id).await {
            Ok(result) => {
                info!(
                    "Downloaded {} ({} bytes) to {}",
                    video_id,
                    result.size,
                    result.path.display()
                );
                self.store
                    .upsert_file_ref(&FileRef::from_result(video_id, result))
                    .await?;
                Ok(Vec::new())
            }
            Err(e @ DelegateError::ExternalTool(_)) | Err(e @ DelegateError::NotFound(_)) => {
                warn!("Download of {} failed: {}", video_id, e);
                self.store
                    .mark_failed(PendingStage::File, std::slice::from_ref(&video_id))
                    .await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

/// Builds and runs the file pipeline.
pub struct FileService {
    fetcher: Arc<dyn FileFetcher>,
    store: Arc<dyn VideoStore>,
    workers: usize,
    seed_limit: usize,
    options: EngineOptions,
}

impl FileService {
    pub fn new(fetcher: Arc<dyn FileFetcher>, store: Arc<dyn VideoStore>) -> Self {
        Self {
            fetcher,
            store,
            workers: 10,
            seed_limit: 1000,
            options: EngineOptions::default(),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn seed_limit(mut self, limit: usize) -> Self {
        self.seed_limit = limit;
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn run(
        &self,
        explicit_ids: &[String],
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> Result<PipelineReport, PipelineError> {
        let ids = if explicit_ids.is_empty() {
            self.store
                .fetch_pending(PendingStage::File, self.seed_limit)
                .await?
        } else {
            let ids = normalize_all(explicit_ids, normalize_video_id, "video id");
            // Failures and file rows need an id row to attach to.
            let inserted = self.store.seed_pending(&ids).await?;
            info!("Using {} explicit ids ({} new)", ids.len(), inserted);
            ids
        };
        info!("Downloading files for {} ids", ids.len());

        let mut pipeline = Pipeline::new("files")
            .stage(
                StageConfig::new(
                    STAGE_NAME,
                    self.workers,
                    Arc::new(DownloadDelegate {
                        fetcher: Arc::clone(&self.fetcher),
                        store: Arc::clone(&self.store),
                    }),
                )
                .guarded(),
            )
            .options(self.options.clone());
        if let Some(tx) = events {
            pipeline = pipeline.events(tx);
        }
        pipeline.run(vec![ids]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileResult, VideoRecord};
    use crate::repository::MemoryVideoStore;
    use crate::services::ytdlp::classify_failure;
    use std::path::PathBuf;

    struct FakeFetcher;

    #[async_trait]
    impl FileFetcher for FakeFetcher {
        async fn fetch(&self, video_id: &str) -> Result<FileResult, DelegateError> {
            match video_id {
                "brokenbroke" => Err(DelegateError::ExternalTool("exit status 1".into())),
                "throttled00" => Err(DelegateError::RateLimited("HTTP Error 429".into())),
                "ab429cdefgh" => Err(classify_failure(
                    "ERROR: [youtube] ab429cdefgh: Video unavailable. This video is private",
                )),
                id => Ok(FileResult {
                    path: PathBuf::from(format!("/media/{}.m4a", id)),
                    size: 2048,
                    format_id: Some("140".into()),
                }),
            }
        }
    }

    async fn store_with_metadata(ids: &[&str]) -> Arc<MemoryVideoStore> {
        let store = Arc::new(MemoryVideoStore::new());
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        store.seed_pending(&ids).await.unwrap();
        for id in &ids {
            store
                .upsert_record(&VideoRecord::new(id.as_str()))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_downloads_pending_files() {
        let store = store_with_metadata(&["aaaaaaaaaaa", "brokenbroke", "ccccccccccc"]).await;
        let service = FileService::new(Arc::new(FakeFetcher), store.clone()).workers(2);

        let report = service.run(&[], None).await.unwrap();
        let stats = &report.stage(STAGE_NAME).unwrap().stats;
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert!(!report.guard.is_set());

        let file = store.file_ref("aaaaaaaaaaa").await.unwrap();
        assert_eq!(file.local_path, PathBuf::from("/media/aaaaaaaaaaa.m4a"));
        assert_eq!(file.file_size, 2048);
        assert_eq!(store.failed(PendingStage::File).await, vec!["brokenbroke"]);

        // Nothing left to do on a second run.
        assert!(matches!(
            service.run(&[], None).await,
            Err(PipelineError::NoWork)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_stops_downloads() {
        let store = store_with_metadata(&["throttled00", "aaaaaaaaaaa", "ccccccccccc"]).await;
        let service = FileService::new(Arc::new(FakeFetcher), store.clone()).workers(1);

        let report = service.run(&[], None).await.unwrap();
        assert!(report.guard.is_set());
        assert!(report.is_drained());
        let stats = &report.stage(STAGE_NAME).unwrap().stats;
        assert_eq!(stats.discarded, 2);
        assert!(store.file_ref("aaaaaaaaaaa").await.is_none());
        assert!(store.failed(PendingStage::File).await.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_video_with_status_digits_is_not_fatal() {
        let mut ids = vec!["ab429cdefgh".to_string()];
        ids.extend((1..=9).map(|i| format!("video{:06}", i)));
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let store = store_with_metadata(&refs).await;
        let service = FileService::new(Arc::new(FakeFetcher), store.clone()).workers(1);

        let report = service.run(&[], None).await.unwrap();
        assert_eq!(report.guard, crate::work_queue::GuardState::Clear);
        let stats = &report.stage(STAGE_NAME).unwrap().stats;
        assert_eq!(stats.succeeded, 9);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.discarded, 0);
        assert_eq!(store.failed(PendingStage::File).await, vec!["ab429cdefgh"]);
    }

    #[tokio::test]
    async fn test_explicit_ids_are_recorded() {
        let store = Arc::new(MemoryVideoStore::new());
        let service = FileService::new(Arc::new(FakeFetcher), store.clone()).workers(1);

        let report = service
            .run(
                &["brokenbroke".to_string(), "aaaaaaaaaaa".to_string()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.stage(STAGE_NAME).unwrap().stats.failed, 1);

        assert_eq!(store.counts().await.unwrap().ids, 2);
        assert_eq!(store.failed(PendingStage::File).await, vec!["brokenbroke"]);
        assert!(store.file_ref("aaaaaaaaaaa").await.is_some());
    }
}
