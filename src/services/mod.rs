//! Pipelines and their external collaborators.
//!
//! - `discovery`: channels and playlists to pending video ids
//! - `metadata`: pending ids to stored metadata records
//! - `files`: ids with metadata to downloaded media files
//! - `ytdlp` / `youtube_api`: adapters for the media tool and the metadata API

pub mod discovery;
pub mod files;
pub mod metadata;
pub mod youtube_api;
pub mod ytdlp;

use std::collections::HashSet;

use tracing::warn;

pub use discovery::{DiscoverySeeds, DiscoveryService};
pub use files::FileService;
pub use metadata::{MetadataItem, MetadataService};
pub use youtube_api::{ApiConfig, MetadataSource, YouTubeApi};
pub use ytdlp::{DownloadOptions, FileFetcher, IdLister, YtDlp, YtDlpFetcher};

/// Normalize raw inputs, dropping unrecognized ones and duplicates.
pub(crate) fn normalize_all(
    inputs: &[String],
    normalize: impl Fn(&str) -> Option<String>,
    kind: &str,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(inputs.len());
    for input in inputs {
        match normalize(input) {
            Some(id) => {
                if seen.insert(id.clone()) {
                    out.push(id);
                }
            }
            None => warn!("Ignoring unrecognized {}: {}", kind, input),
        }
    }
    out
}
