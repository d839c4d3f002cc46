//! Identifier parsing and seed-list reading.
//!
//! Seeds arrive as raw ids, `@handles`, or full YouTube URLs, either inline
//! (comma or whitespace separated) or from `.txt`/`.csv` files.

use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

static PLAYLIST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{12,64}$").unwrap());

static HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\-]{1,100}$").unwrap());

/// Split an inline list on commas and whitespace.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Read ids from a `.txt` (one per line) or `.csv` (first column) file.
///
/// A CSV header row is dropped when its first cell does not look like an
/// identifier of any kind.
pub async fn read_ids_from_file(path: &Path) -> io::Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to read id file '{}': {}", path.display(), e),
        )
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("csv") => Ok(parse_csv_first_column(&contents)),
        Some("txt") | None => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()),
        Some(other) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Unsupported id file type '.{}' for '{}' (expected .txt or .csv)",
                other,
                path.display()
            ),
        )),
    }
}

fn parse_csv_first_column(contents: &str) -> Vec<String> {
    let mut ids: Vec<String> = contents
        .lines()
        .filter_map(|line| {
            let cell = line.split(',').next()?.trim().trim_matches('"').trim();
            (!cell.is_empty()).then(|| cell.to_string())
        })
        .collect();

    if let Some(first) = ids.first() {
        if looks_like_header(first) {
            ids.remove(0);
        }
    }
    ids
}

fn looks_like_header(cell: &str) -> bool {
    let lower = cell.to_ascii_lowercase();
    matches!(
        lower.as_str(),
        "id" | "video_id" | "videoid" | "playlist_id" | "user" | "handle" | "channel"
    )
}

fn parse_youtube_url(input: &str) -> Option<Url> {
    let url = Url::parse(input).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    matches!(host, "youtube.com" | "youtu.be" | "music.youtube.com").then_some(url)
}

/// Extract an 11-character video id from a raw id or video URL.
pub fn normalize_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if VIDEO_ID.is_match(input) {
        return Some(input.to_string());
    }

    let url = parse_youtube_url(input)?;
    let candidate = if url.host_str().is_some_and(|h| h.ends_with("youtu.be")) {
        url.path_segments()?.next().map(str::to_string)
    } else if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        Some(v.into_owned())
    } else {
        let mut segments = url.path_segments()?;
        match segments.next() {
            Some("shorts") | Some("embed") | Some("v") | Some("live") => {
                segments.next().map(str::to_string)
            }
            _ => None,
        }
    }?;

    VIDEO_ID.is_match(&candidate).then_some(candidate)
}

/// Extract a playlist id from a raw id or a URL carrying `list=`.
pub fn normalize_playlist_id(input: &str) -> Option<String> {
    let input = input.trim();
    if PLAYLIST_ID.is_match(input) {
        return Some(input.to_string());
    }
    let url = parse_youtube_url(input)?;
    let (_, list) = url.query_pairs().find(|(k, _)| k == "list")?;
    PLAYLIST_ID.is_match(&list).then(|| list.into_owned())
}

/// Extract a channel handle (without `@`) from `@name`, `name`, or a channel URL.
pub fn normalize_handle(input: &str) -> Option<String> {
    let input = input.trim();
    let raw = if let Some(url) = parse_youtube_url(input) {
        let first = url.path_segments()?.next()?.to_string();
        first.strip_prefix('@')?.to_string()
    } else {
        input.trim_start_matches('@').to_string()
    };
    HANDLE.is_match(&raw).then_some(raw)
}

/// Listing URL for a channel's uploads.
pub fn channel_videos_url(handle: &str) -> String {
    format!("https://www.youtube.com/@{}/videos", handle)
}

/// Listing URL for a channel's playlists.
pub fn channel_playlists_url(handle: &str) -> String {
    format!("https://www.youtube.com/@{}/playlists", handle)
}

pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", playlist_id)
}

pub fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
