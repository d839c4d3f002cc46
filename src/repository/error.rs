//! Datastore error classification.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

/// Error classes reported by every datastore operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach the database, or it was busy/locked. Safe to retry.
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("{0}")]
    Unknown(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(kind, info) => {
                let message = info.message().to_string();
                match kind {
                    DatabaseErrorKind::UniqueViolation
                    | DatabaseErrorKind::ForeignKeyViolation
                    | DatabaseErrorKind::NotNullViolation
                    | DatabaseErrorKind::CheckViolation => StoreError::Constraint(message),
                    DatabaseErrorKind::ClosedConnection
                    | DatabaseErrorKind::UnableToSendCommand => StoreError::Connection(message),
                    _ if is_busy_message(&message) => StoreError::Connection(message),
                    _ => StoreError::Unknown(message),
                }
            }
            DieselError::BrokenTransactionManager => {
                StoreError::Connection("broken transaction manager".to_string())
            }
            other => StoreError::Unknown(other.to_string()),
        }
    }
}

fn is_busy_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database is busy")
        || lower.contains("unable to open database")
}
