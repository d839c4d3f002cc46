//! SQLite connection pool.
//!
//! Connections are created on demand; SQLite handles concurrent readers and
//! serializes writers behind its busy timeout.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

use super::util::{sqlite_path_from_url, to_connection_error};

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 10_000;

/// Lightweight SQLite pool (creates connections on demand).
#[derive(Debug, Clone)]
pub struct DbPool {
    database_url: String,
}

impl DbPool {
    /// Create a pool from a database URL or plain file path.
    pub fn from_url(database_url: &str) -> Self {
        Self {
            database_url: sqlite_path_from_url(database_url).to_string(),
        }
    }

    /// Create pool from a file path.
    pub fn from_path(path: &Path) -> Self {
        Self::from_url(&path.display().to_string())
    }

    /// Get a connection.
    pub async fn get(&self) -> Result<SqliteConn, DbError> {
        let mut conn = SqliteConn::establish(&self.database_url)
            .await
            .map_err(to_connection_error)?;
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            BUSY_TIMEOUT_MS
        ))
        .await?;
        Ok(conn)
    }

    /// Get the database path.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

/// Run a block with a fresh connection bound to `$conn`.
///
/// # Example
/// ```ignore
/// with_conn!(self.pool, conn => {
///     video_ids::table.count().get_result::<i64>(&mut conn).await
/// })
/// ```
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident => $body:expr) => {{
        let mut $conn = $pool.get().await?;
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_strips_scheme() {
        let pool = DbPool::from_url("sqlite:/tmp/videos.db");
        assert_eq!(pool.database_url(), "/tmp/videos.db");
    }

    #[tokio::test]
    async fn test_get_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        let pool = DbPool::from_path(&path);
        pool.get().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_get_reports_connection_error() {
        let pool = DbPool::from_url("/nonexistent-dir/for/sure/videos.db");
        let err = pool.get().await.err().unwrap();
        assert!(matches!(
            crate::repository::StoreError::from(err),
            crate::repository::StoreError::Connection(_)
        ));
    }
}
