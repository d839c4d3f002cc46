//! Database context: connection pool, schema setup and store access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::diesel_store::DieselVideoStore;
use super::pool::{DbError, DbPool};
use crate::with_conn;

/// Entry point for database access. Create one per command.
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context for a SQLite database file.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::from_path(db_path),
        }
    }

    /// Create a context from a `sqlite:` URL or plain path.
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: DbPool::from_url(database_url),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Store used by the pipelines.
    pub fn videos(&self) -> DieselVideoStore {
        DieselVideoStore::new(self.pool.clone())
    }

    /// Open a connection and run a trivial statement.
    pub async fn test_connection(&self) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            conn.batch_execute("SELECT 1").await
        })
    }

    /// Create all tables if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            conn.batch_execute(
                r#"
                PRAGMA journal_mode = WAL;

                CREATE TABLE IF NOT EXISTS video_ids (
                    video_id TEXT PRIMARY KEY NOT NULL,
                    discovered_at TEXT NOT NULL,
                    failed_metadata BOOLEAN NOT NULL DEFAULT 0,
                    failed_file BOOLEAN NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS yt_metadata (
                    video_id TEXT PRIMARY KEY NOT NULL,
                    kind TEXT,
                    etag TEXT,
                    title TEXT,
                    description TEXT,
                    published_at TEXT,
                    channel_id TEXT,
                    channel_title TEXT,
                    category_id TEXT,
                    live_broadcast_content TEXT,
                    default_language TEXT,
                    default_audio_language TEXT,
                    duration TEXT,
                    dimension TEXT,
                    definition TEXT,
                    caption TEXT,
                    licensed_content BOOLEAN,
                    projection TEXT,
                    upload_status TEXT,
                    privacy_status TEXT,
                    license TEXT,
                    embeddable BOOLEAN,
                    public_stats_viewable BOOLEAN,
                    made_for_kids BOOLEAN,
                    view_count BIGINT,
                    like_count BIGINT,
                    dislike_count BIGINT NOT NULL DEFAULT 0,
                    favorite_count BIGINT,
                    comment_count BIGINT,
                    event_date TEXT,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS yt_tags (
                    video_id TEXT NOT NULL,
                    tag TEXT NOT NULL,
                    PRIMARY KEY (video_id, tag)
                );

                CREATE TABLE IF NOT EXISTS yt_thumbnails (
                    video_id TEXT NOT NULL,
                    thumbnail_size TEXT NOT NULL,
                    url TEXT NOT NULL,
                    width INTEGER,
                    height INTEGER,
                    PRIMARY KEY (video_id, thumbnail_size)
                );

                CREATE TABLE IF NOT EXISTS yt_localized (
                    video_id TEXT NOT NULL,
                    language TEXT NOT NULL,
                    title TEXT,
                    description TEXT,
                    PRIMARY KEY (video_id, language)
                );

                CREATE TABLE IF NOT EXISTS yt_topic_categories (
                    video_id TEXT NOT NULL,
                    category TEXT NOT NULL,
                    PRIMARY KEY (video_id, category)
                );

                CREATE TABLE IF NOT EXISTS yt_video_files (
                    video_id TEXT PRIMARY KEY NOT NULL,
                    format_id TEXT,
                    file_size BIGINT NOT NULL,
                    local_path TEXT NOT NULL,
                    downloaded_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_video_ids_discovered ON video_ids(discovered_at);
                "#,
            )
            .await
        })
    }

    /// List user tables, for diagnostics.
    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        with_conn!(self.pool, conn => {
            let rows: Vec<TableName> = diesel_async::RunQueryDsl::load(
                diesel::sql_query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                ),
                &mut conn,
            )
            .await?;
            Ok(rows.into_iter().map(|r| r.name).collect())
        })
    }
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}
