//! Remote metadata API client.
//!
//! One `videos` call resolves up to 50 identifiers. Items come back as raw
//! JSON so a single bad item can be marked failed without losing the rest
//! of the batch.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::models::{Localization, Thumbnail, VideoRecord, THUMBNAIL_SIZES};
use crate::utils::{extract_date, format_duration};
use crate::work_queue::DelegateError;

/// Parts requested for every video.
pub const VIDEO_PARTS: &str = "contentDetails,id,liveStreamingDetails,localizations,player,recordingDetails,snippet,statistics,status,topicDetails";

/// Language recorded for the snippet's localized text.
const LOCALIZED_LANGUAGE: &str = "en";

/// Fetches raw video items for a batch of identifiers.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<Value>, DelegateError>;
}

/// Metadata API client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub proxy: Option<String>,
}

/// Client for the `videos` endpoint.
pub struct YouTubeApi {
    config: ApiConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: Option<String>,
}

impl YouTubeApi {
    pub fn new(config: ApiConfig) -> Result<Self, DelegateError> {
        let mut builder = Client::builder().timeout(config.timeout).gzip(true);
        if let Some(ref proxy) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| DelegateError::Http(format!("Invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| DelegateError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

#[async_trait]
impl MetadataSource for YouTubeApi {
    async fn fetch_videos(&self, ids: &[String]) -> Result<Vec<Value>, DelegateError> {
        let url = format!("{}/videos", self.config.base_url.trim_end_matches('/'));
        let joined = ids.join(",");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("part", VIDEO_PARTS),
                ("id", joined.as_str()),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let body: VideoListResponse = resp
                .json()
                .await
                .map_err(|e| DelegateError::Malformed(e.to_string()))?;
            debug!("Fetched {} of {} requested videos", body.items.len(), ids.len());
            return Ok(body.items);
        }

        let text = resp.text().await.unwrap_or_default();
        Err(classify_status(status, &text))
    }
}

/// Map a non-success response onto a delegate error.
fn classify_status(status: StatusCode, body: &str) -> DelegateError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default();
    let reason = detail
        .errors
        .first()
        .and_then(|e| e.reason.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let message = detail.message.unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::FORBIDDEN if reason == "quotaExceeded" => {
            error!("Metadata API quota exceeded: {}", message);
            DelegateError::QuotaExceeded(message)
        }
        StatusCode::TOO_MANY_REQUESTS => DelegateError::RateLimited(message),
        _ => DelegateError::Http(format!(
            "HTTP {} (code {}, reason {}): {}",
            status.as_u16(),
            detail.code.unwrap_or(status.as_u16()),
            reason,
            message
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVideo {
    id: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    content_details: ContentDetails,
    #[serde(default)]
    status: VideoStatus,
    #[serde(default)]
    statistics: Statistics,
    #[serde(default)]
    topic_details: TopicDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: Option<String>,
    channel_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    thumbnails: HashMap<String, ApiThumbnail>,
    channel_title: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    category_id: Option<String>,
    live_broadcast_content: Option<String>,
    default_language: Option<String>,
    default_audio_language: Option<String>,
    localized: Option<LocalizedText>,
}

#[derive(Debug, Deserialize)]
struct ApiThumbnail {
    url: String,
    width: Option<i32>,
    height: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    duration: Option<String>,
    dimension: Option<String>,
    definition: Option<String>,
    caption: Option<String>,
    licensed_content: Option<bool>,
    projection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus {
    upload_status: Option<String>,
    privacy_status: Option<String>,
    license: Option<String>,
    embeddable: Option<bool>,
    public_stats_viewable: Option<bool>,
    made_for_kids: Option<bool>,
}

/// Counts arrive as decimal strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
    favorite_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicDetails {
    #[serde(default)]
    topic_categories: Vec<String>,
}

/// Identifier of a raw item, if it has one.
pub fn item_id(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

/// Convert one raw API item into a [`VideoRecord`].
pub fn parse_video(item: Value) -> Result<VideoRecord, DelegateError> {
    let video: ApiVideo =
        serde_json::from_value(item).map_err(|e| DelegateError::Malformed(e.to_string()))?;
    if video.id.trim().is_empty() {
        return Err(DelegateError::Malformed("item without an id".to_string()));
    }

    let count = |field: &str, value: Option<String>| -> Result<Option<i64>, DelegateError> {
        value
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    DelegateError::Malformed(format!("{} for {} is not a number: {}", field, video.id, v))
                })
            })
            .transpose()
    };
    let stats = &video.statistics;
    let view_count = count("viewCount", stats.view_count.clone())?;
    let like_count = count("likeCount", stats.like_count.clone())?;
    let favorite_count = count("favoriteCount", stats.favorite_count.clone())?;
    let comment_count = count("commentCount", stats.comment_count.clone())?;

    let published_at = video
        .snippet
        .published_at
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| {
                    DelegateError::Malformed(format!("publishedAt for {}: {}", video.id, e))
                })
        })
        .transpose()?;

    let ApiVideo {
        id,
        kind,
        etag,
        mut snippet,
        content_details,
        status,
        topic_details,
        ..
    } = video;

    let thumbnails = THUMBNAIL_SIZES
        .iter()
        .filter_map(|size| {
            snippet.thumbnails.remove(*size).map(|t| Thumbnail {
                size: size.to_string(),
                url: t.url,
                width: t.width,
                height: t.height,
            })
        })
        .collect();

    let localized = snippet.localized.map(|l| Localization {
        language: LOCALIZED_LANGUAGE.to_string(),
        title: l.title,
        description: l.description,
    });

    let event_date = snippet.title.as_deref().and_then(extract_date);

    Ok(VideoRecord {
        video_id: id,
        kind,
        etag,
        title: snippet.title,
        description: snippet.description,
        published_at,
        channel_id: snippet.channel_id,
        channel_title: snippet.channel_title,
        category_id: snippet.category_id,
        live_broadcast_content: snippet.live_broadcast_content,
        default_language: snippet.default_language,
        default_audio_language: snippet.default_audio_language,
        duration: content_details.duration.as_deref().map(format_duration),
        dimension: content_details.dimension,
        definition: content_details.definition,
        caption: content_details.caption,
        licensed_content: content_details.licensed_content,
        projection: content_details.projection,
        upload_status: status.upload_status,
        privacy_status: status.privacy_status,
        license: status.license,
        embeddable: status.embeddable,
        public_stats_viewable: status.public_stats_viewable,
        made_for_kids: status.made_for_kids,
        view_count,
        like_count,
        dislike_count: 0,
        favorite_count,
        comment_count,
        tags: snippet.tags,
        thumbnails,
        localized,
        topic_categories: topic_details.topic_categories,
        event_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn sample_item() -> Value {
        json!({
            "kind": "youtube#video",
            "etag": "etag-1",
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "publishedAt": "2023-07-04T18:30:00Z",
                "channelId": "UC123",
                "title": "Council meeting 07.04.2023",
                "description": "Full session",
                "thumbnails": {
                    "default": {"url": "https://i.ytimg.com/d.jpg", "width": 120, "height": 90},
                    "maxres": {"url": "https://i.ytimg.com/m.jpg", "width": 1280, "height": 720},
                    "high": {"url": "https://i.ytimg.com/h.jpg", "width": 480, "height": 360}
                },
                "channelTitle": "City Hall",
                "tags": ["council", "budget"],
                "categoryId": "25",
                "liveBroadcastContent": "none",
                "localized": {"title": "Council meeting", "description": "Full session"},
                "defaultAudioLanguage": "en"
            },
            "contentDetails": {
                "duration": "PT1H2M3S",
                "dimension": "2d",
                "definition": "hd",
                "caption": "false",
                "licensedContent": false,
                "projection": "rectangular"
            },
            "status": {
                "uploadStatus": "processed",
                "privacyStatus": "public",
                "license": "youtube",
                "embeddable": true,
                "publicStatsViewable": true,
                "madeForKids": false
            },
            "statistics": {
                "viewCount": "1200",
                "likeCount": "34",
                "favoriteCount": "0",
                "commentCount": "5"
            },
            "topicDetails": {
                "topicCategories": ["https://en.wikipedia.org/wiki/Politics"]
            }
        })
    }

    #[test]
    fn test_parse_video() {
        let record = parse_video(sample_item()).unwrap();

        assert_eq!(record.video_id, "dQw4w9WgXcQ");
        assert_eq!(record.kind.as_deref(), Some("youtube#video"));
        assert_eq!(record.duration.as_deref(), Some("1H 2M 3S"));
        assert_eq!(record.view_count, Some(1200));
        assert_eq!(record.dislike_count, 0);
        assert_eq!(record.tags, vec!["council", "budget"]);
        assert_eq!(record.embeddable, Some(true));
        assert_eq!(
            record.published_at.map(|d| d.to_rfc3339()),
            Some("2023-07-04T18:30:00+00:00".to_string())
        );
        assert_eq!(record.event_date, NaiveDate::from_ymd_opt(2023, 7, 4));

        let sizes: Vec<&str> = record.thumbnails.iter().map(|t| t.size.as_str()).collect();
        assert_eq!(sizes, vec!["default", "high", "maxres"]);
        assert_eq!(record.thumbnails[2].width, Some(1280));

        let localized = record.localized.unwrap();
        assert_eq!(localized.language, "en");
        assert_eq!(localized.title.as_deref(), Some("Council meeting"));
        assert_eq!(record.topic_categories.len(), 1);
    }

    #[test]
    fn test_parse_video_minimal() {
        let record = parse_video(json!({"id": "abc"})).unwrap();
        assert_eq!(record, VideoRecord::new("abc"));
    }

    #[test]
    fn test_parse_video_malformed() {
        let mut bad_count = sample_item();
        bad_count["statistics"]["viewCount"] = json!("lots");
        assert!(matches!(
            parse_video(bad_count),
            Err(DelegateError::Malformed(_))
        ));

        let mut bad_date = sample_item();
        bad_date["snippet"]["publishedAt"] = json!("yesterday");
        assert!(matches!(parse_video(bad_date), Err(DelegateError::Malformed(_))));

        assert!(matches!(
            parse_video(json!({"kind": "youtube#video"})),
            Err(DelegateError::Malformed(_))
        ));
        assert!(matches!(parse_video(json!({"id": ""})), Err(DelegateError::Malformed(_))));
    }

    #[test]
    fn test_item_id() {
        assert_eq!(item_id(&sample_item()), Some("dQw4w9WgXcQ"));
        assert_eq!(item_id(&json!({"id": 5})), None);
    }

    #[test]
    fn test_classify_status() {
        let quota = r#"{"error": {"code": 403, "message": "The request cannot be completed because you have exceeded your quota.", "errors": [{"reason": "quotaExceeded"}]}}"#;
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, quota),
            DelegateError::QuotaExceeded(_)
        ));

        let forbidden = r#"{"error": {"code": 403, "message": "Forbidden", "errors": [{"reason": "forbidden"}]}}"#;
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, forbidden),
            DelegateError::Http(_)
        ));

        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            DelegateError::RateLimited(_)
        ));
        match classify_status(StatusCode::BAD_REQUEST, "not json") {
            DelegateError::Http(msg) => assert!(msg.starts_with("HTTP 400")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
