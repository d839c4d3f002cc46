//! ytacquire - YouTube identifier, metadata and media acquisition.
//!
//! Three pipelines built on one staged work-queue engine:
//! discovery of video ids from channels and playlists, metadata resolution
//! through the YouTube Data API, and media download through yt-dlp.

pub mod cli;
pub mod config;
pub mod logging;
pub mod models;
pub mod repository;
pub mod schema;
pub mod services;
pub mod utils;
pub mod work_queue;
