//! Shared utility functions.
//!
//! - `ids`: identifier parsing, listing URLs and seed-file reading
//! - `text`: title dates, durations and filenames

mod ids;
mod text;

pub use ids::{
    channel_playlists_url, channel_videos_url, normalize_handle, normalize_playlist_id,
    normalize_video_id, playlist_url, read_ids_from_file, split_list, video_url,
};
pub use text::{extract_date, format_duration, sanitize_filename};
