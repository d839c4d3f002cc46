//! Video identifier and metadata models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A resolution step that can leave an identifier pending or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStage {
    Metadata,
    File,
}

impl PendingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::File => "file",
        }
    }
}

/// Thumbnail sizes reported by the metadata API, in storage order.
pub const THUMBNAIL_SIZES: [&str; 5] = ["default", "medium", "high", "standard", "maxres"];

/// One thumbnail variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Size name (`default`, `medium`, `high`, `standard`, `maxres`).
    pub size: String,
    pub url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// Localized title and description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localization {
    pub language: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Resolved metadata for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub kind: Option<String>,
    pub etag: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub category_id: Option<String>,
    pub live_broadcast_content: Option<String>,
    pub default_language: Option<String>,
    pub default_audio_language: Option<String>,
    /// Duration as `"#H #M #S"` text.
    pub duration: Option<String>,
    pub dimension: Option<String>,
    pub definition: Option<String>,
    pub caption: Option<String>,
    pub licensed_content: Option<bool>,
    pub projection: Option<String>,
    pub upload_status: Option<String>,
    pub privacy_status: Option<String>,
    pub license: Option<String>,
    pub embeddable: Option<bool>,
    pub public_stats_viewable: Option<bool>,
    pub made_for_kids: Option<bool>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    /// No longer published by the API; always zero.
    pub dislike_count: i64,
    pub favorite_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub tags: Vec<String>,
    pub thumbnails: Vec<Thumbnail>,
    pub localized: Option<Localization>,
    pub topic_categories: Vec<String>,
    /// Event date parsed from the title, if it carries one.
    pub event_date: Option<NaiveDate>,
}

impl VideoRecord {
    /// An otherwise empty record for `video_id`.
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            kind: None,
            etag: None,
            title: None,
            description: None,
            published_at: None,
            channel_id: None,
            channel_title: None,
            category_id: None,
            live_broadcast_content: None,
            default_language: None,
            default_audio_language: None,
            duration: None,
            dimension: None,
            definition: None,
            caption: None,
            licensed_content: None,
            projection: None,
            upload_status: None,
            privacy_status: None,
            license: None,
            embeddable: None,
            public_stats_viewable: None,
            made_for_kids: None,
            view_count: None,
            like_count: None,
            dislike_count: 0,
            favorite_count: None,
            comment_count: None,
            tags: Vec::new(),
            thumbnails: Vec::new(),
            localized: None,
            topic_categories: Vec::new(),
            event_date: None,
        }
    }
}
