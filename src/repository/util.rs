//! Repository utilities.

use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind};

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Like [`to_diesel_error`], but marks the failure as a lost or unreachable connection.
pub fn to_connection_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        DatabaseErrorKind::ClosedConnection,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Strip an optional `sqlite:` / `sqlite://` scheme from a database URL.
pub fn sqlite_path_from_url(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_path_from_url() {
        assert_eq!(sqlite_path_from_url("sqlite:/data/yt.db"), "/data/yt.db");
        assert_eq!(sqlite_path_from_url("sqlite:///data/yt.db"), "/data/yt.db");
        assert_eq!(sqlite_path_from_url("yt.db"), "yt.db");
    }

    #[test]
    fn test_error_message_preserved() {
        let err = to_diesel_error("boom");
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::Unknown, info) => {
                assert_eq!(info.message(), "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
