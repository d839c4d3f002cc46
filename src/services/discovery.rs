//! Identifier discovery pipeline.
//!
//! `users -> playlists -> videos`. Channels fan out to their playlists and
//! uploads, playlists fan out to videos, and every video id that reaches
//! the last stage is persisted as pending.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::normalize_all;
use super::ytdlp::IdLister;
use crate::repository::VideoStore;
use crate::utils::{
    channel_playlists_url, channel_videos_url, normalize_handle, normalize_playlist_id,
    normalize_video_id, playlist_url,
};
use crate::work_queue::{
    DelegateError, EngineOptions, Pipeline, PipelineError, PipelineEvent, PipelineReport,
    Routed, StageConfig, StageDelegate,
};

pub const USERS: usize = 0;
pub const PLAYLISTS: usize = 1;
pub const VIDEOS: usize = 2;

pub const STAGE_NAMES: [&str; 3] = ["users", "playlists", "videos"];

/// Raw discovery inputs, normalized before seeding.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySeeds {
    pub users: Vec<String>,
    pub playlists: Vec<String>,
    pub videos: Vec<String>,
}

impl DiscoverySeeds {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.playlists.is_empty() && self.videos.is_empty()
    }

    /// Normalized per-stage seed lists; unrecognized inputs are dropped.
    pub fn into_stage_seeds(self) -> Vec<Vec<String>> {
        vec![
            normalize_all(&self.users, normalize_handle, "channel handle"),
            normalize_all(&self.playlists, normalize_playlist_id, "playlist id"),
            normalize_all(&self.videos, normalize_video_id, "video id"),
        ]
    }
}

struct UsersDelegate {
    lister: Arc<dyn IdLister>,
}

#[async_trait]
impl StageDelegate<String> for UsersDelegate {
    async fn process(&self, handle: String) -> Result<Vec<Routed<String>>, DelegateError> {
        let playlists = tolerate_missing(
            self.lister
                .list_ids(&channel_playlists_url(&handle))
                .await,
        )?;
        let videos = tolerate_missing(self.lister.list_ids(&channel_videos_url(&handle)).await)?;

        if playlists.is_none() && videos.is_none() {
            return Err(DelegateError::NotFound(format!(
                "channel @{} has neither playlists nor videos",
                handle
            )));
        }

        let playlists = playlists.unwrap_or_default();
        let videos = videos.unwrap_or_default();
        debug!(
            "@{}: {} playlists, {} videos",
            handle,
            playlists.len(),
            videos.len()
        );

        Ok(playlists
            .into_iter()
            .map(|id| Routed::to(PLAYLISTS, id))
            .chain(videos.into_iter().map(|id| Routed::to(VIDEOS, id)))
            .collect())
    }
}

/// A missing tab becomes `None`; any other failure is passed through.
fn tolerate_missing(
    result: Result<Vec<String>, DelegateError>,
) -> Result<Option<Vec<String>>, DelegateError> {
    match result {
        Ok(ids) => Ok(Some(ids)),
        Err(DelegateError::NotFound(msg)) => {
            debug!("Listing not available: {}", msg);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

struct PlaylistsDelegate {
    lister: Arc<dyn IdLister>,
}

#[async_trait]
impl StageDelegate<String> for PlaylistsDelegate {
    async fn process(&self, playlist_id: String) -> Result<Vec<Routed<String>>, DelegateError> {
        let ids = self.lister.list_ids(&playlist_url(&playlist_id)).await?;
        debug!("Playlist {}: {} videos", playlist_id, ids.len());
        Ok(ids.into_iter().map(|id| Routed::to(VIDEOS, id)).collect())
    }
}

struct VideosDelegate {
    store: Arc<dyn VideoStore>,
}

#[async_trait]
impl StageDelegate<String> for VideosDelegate {
    async fn process(&self, video_id: String) -> Result<Vec<Routed<String>>, DelegateError> {
        let inserted = self.store.seed_pending(std::slice::from_ref(&video_id)).await?;
        if inserted == 0 {
            debug!("Video {} already known", video_id);
        }
        Ok(Vec::new())
    }
}

/// Builds and runs the discovery pipeline.
pub struct DiscoveryService {
    lister: Arc<dyn IdLister>,
    store: Arc<dyn VideoStore>,
    workers: usize,
    options: EngineOptions,
}

impl DiscoveryService {
    pub fn new(lister: Arc<dyn IdLister>, store: Arc<dyn VideoStore>) -> Self {
        Self {
            lister,
            store,
            workers: 5,
            options: EngineOptions::default(),
        }
    }

    /// Workers per stage.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    fn pipeline(&self) -> Pipeline<String> {
        Pipeline::new("ids")
            .stage(
                StageConfig::new(
                    STAGE_NAMES[USERS],
                    self.workers,
                    Arc::new(UsersDelegate {
                        lister: Arc::clone(&self.lister),
                    }),
                )
                .guarded(),
            )
            .stage(
                StageConfig::new(
                    STAGE_NAMES[PLAYLISTS],
                    self.workers,
                    Arc::new(PlaylistsDelegate {
                        lister: Arc::clone(&self.lister),
                    }),
                )
                .guarded(),
            )
            .stage(StageConfig::new(
                STAGE_NAMES[VIDEOS],
                self.workers,
                Arc::new(VideosDelegate {
                    store: Arc::clone(&self.store),
                }),
            ))
            .options(self.options.clone())
    }

    pub async fn run(
        &self,
        seeds: DiscoverySeeds,
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> Result<PipelineReport, PipelineError> {
        let seeds = seeds.into_stage_seeds();
        info!(
            "Discovering ids from {} channels, {} playlists, {} videos",
            seeds[USERS].len(),
            seeds[PLAYLISTS].len(),
            seeds[VIDEOS].len()
        );

        let mut pipeline = self.pipeline();
        if let Some(tx) = events {
            pipeline = pipeline.events(tx);
        }
        pipeline.run(seeds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryVideoStore;
    use std::collections::HashMap;

    struct FakeLister {
        listings: HashMap<String, Result<Vec<String>, &'static str>>,
    }

    impl FakeLister {
        fn new(entries: &[(&str, Result<&[&str], &'static str>)]) -> Self {
            let listings = entries
                .iter()
                .map(|(url, r)| {
                    let r = r.map(|ids| ids.iter().map(|s| s.to_string()).collect());
                    (url.to_string(), r)
                })
                .collect();
            Self { listings }
        }
    }

    #[async_trait]
    impl IdLister for FakeLister {
        async fn list_ids(&self, url: &str) -> Result<Vec<String>, DelegateError> {
            match self.listings.get(url) {
                Some(Ok(ids)) => Ok(ids.clone()),
                Some(Err("429")) => Err(DelegateError::RateLimited(url.to_string())),
                Some(Err(_)) | None => Err(DelegateError::NotFound(url.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_users_tolerates_one_missing_tab() {
        let lister = FakeLister::new(&[(
            "https://www.youtube.com/@council/videos",
            Ok(&["aaaaaaaaaaa", "bbbbbbbbbbb"]),
        )]);
        let delegate = UsersDelegate {
            lister: Arc::new(lister),
        };

        let routed = delegate.process("council".into()).await.unwrap();
        assert_eq!(
            routed,
            vec![
                Routed::to(VIDEOS, "aaaaaaaaaaa".to_string()),
                Routed::to(VIDEOS, "bbbbbbbbbbb".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_users_both_tabs_missing() {
        let delegate = UsersDelegate {
            lister: Arc::new(FakeLister::new(&[])),
        };
        assert!(matches!(
            delegate.process("ghost".into()).await,
            Err(DelegateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_users_rate_limit_propagates() {
        let delegate = UsersDelegate {
            lister: Arc::new(FakeLister::new(&[
                ("https://www.youtube.com/@busy/playlists", Err("429")),
                ("https://www.youtube.com/@busy/videos", Ok(&["aaaaaaaaaaa"])),
            ])),
        };
        assert!(matches!(
            delegate.process("busy".into()).await,
            Err(DelegateError::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn test_full_discovery_run() {
        let lister = FakeLister::new(&[
            (
                "https://www.youtube.com/@council/playlists",
                Ok(&["PLaaaaaaaaaaaa"]),
            ),
            (
                "https://www.youtube.com/@council/videos",
                Ok(&["aaaaaaaaaaa", "bbbbbbbbbbb"]),
            ),
            (
                "https://www.youtube.com/playlist?list=PLaaaaaaaaaaaa",
                Ok(&["bbbbbbbbbbb", "ccccccccccc"]),
            ),
        ]);
        let store = Arc::new(MemoryVideoStore::new());
        let service = DiscoveryService::new(Arc::new(lister), store.clone()).workers(2);

        let seeds = DiscoverySeeds {
            users: vec!["@council".into()],
            videos: vec!["https://youtu.be/ddddddddddd".into()],
            ..Default::default()
        };
        let report = service.run(seeds, None).await.unwrap();

        assert!(report.is_drained());
        assert_eq!(report.stage("users").unwrap().stats.succeeded, 1);
        assert_eq!(report.stage("playlists").unwrap().stats.succeeded, 1);
        assert_eq!(report.stage("videos").unwrap().stats.succeeded, 5);

        let mut ids = store.ids().await;
        ids.sort();
        assert_eq!(
            ids,
            vec!["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc", "ddddddddddd"]
        );
    }

    #[test]
    fn test_seeds_normalized() {
        let seeds = DiscoverySeeds {
            users: vec!["https://www.youtube.com/@council".into(), "@council".into()],
            playlists: vec!["not a playlist!".into()],
            videos: vec![],
        };
        let stage_seeds = seeds.into_stage_seeds();
        assert_eq!(stage_seeds[USERS], vec!["council"]);
        assert!(stage_seeds[PLAYLISTS].is_empty());
    }
}
