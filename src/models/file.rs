//! Downloaded media file models.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What the media tool reports for a finished download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub size: u64,
    pub format_id: Option<String>,
}

/// Stored reference from a video to its local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub video_id: String,
    pub format_id: Option<String>,
    pub file_size: u64,
    pub local_path: PathBuf,
}

impl FileRef {
    pub fn from_result(video_id: impl Into<String>, result: FileResult) -> Self {
        Self {
            video_id: video_id.into(),
            format_id: result.format_id,
            file_size: result.size,
            local_path: result.path,
        }
    }
}
