//! Store error taxonomy.
//!
//! Callers match on [`StoreError`] variants. Messages name record types and
//! IDs but never raw keys.

use folio_types::{CodecError, ErrorCode};
use snafu::Snafu;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineError;
use crate::keys::EntityType;

/// Errors returned by store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The record is absent or tombstoned.
    #[snafu(display("{entity} {id} not found"))]
    NotFound { entity: EntityType, id: String },

    /// A record with this primary key already exists, tombstoned or not.
    #[snafu(display("{entity} {id} already exists"))]
    AlreadyExists { entity: EntityType, id: String },

    /// A unique index value is claimed by another record.
    #[snafu(display("{index} '{value}' is already in use"))]
    Conflict { index: String, value: String },

    /// Malformed caller input (cursor, pagination parameters, unknown alias).
    #[snafu(display("Invalid input: {message}"))]
    InvalidInput { message: String },

    /// The caller may not perform this operation.
    #[snafu(display("Forbidden"))]
    Forbidden,

    /// The session's lifetime has elapsed.
    #[snafu(display("session {id} has expired"))]
    Expired { id: String },

    /// The caller's cancellation token fired.
    #[snafu(display("Operation cancelled"))]
    Cancelled,

    /// Underlying storage operation failed.
    #[snafu(context(false), display("Storage error: {source}"))]
    Engine {
        source: EngineError,
        #[snafu(implicit)]
        location: snafu::Location,
    },

    /// Serialization or deserialization failed.
    #[snafu(context(false), display("Codec error: {source}"))]
    Codec {
        source: CodecError,
        #[snafu(implicit)]
        location: snafu::Location,
    },
}

impl StoreError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::RecordNotFound,
            Self::AlreadyExists { .. } => ErrorCode::RecordAlreadyExists,
            Self::Conflict { .. } => ErrorCode::IndexConflict,
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
            Self::Forbidden => ErrorCode::Forbidden,
            Self::Expired { .. } => ErrorCode::SessionExpired,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Engine { source, .. } => source.code(),
            Self::Codec { .. } => ErrorCode::StorageSerialization,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Whether this is [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(entity: EntityType, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Fails with [`StoreError::Cancelled`] once `cancel` has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return CancelledSnafu.fail();
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_retryability() {
        let err = StoreError::not_found(EntityType::Book, "b1");
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
        assert!(!err.is_retryable());
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "book b1 not found");

        let err = StoreError::Conflict { index: "email".into(), value: "a@b".into() };
        assert_eq!(err.code(), ErrorCode::IndexConflict);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_messages_do_not_leak_keys() {
        let err = StoreError::AlreadyExists { entity: EntityType::Tag, id: "t1".into() };
        assert!(!err.to_string().contains("tag:t1"));
        assert!(!err.to_string().contains("idx:"));
    }

    #[test]
    fn test_ensure_active() {
        let cancel = CancellationToken::new();
        assert!(ensure_active(&cancel).is_ok());
        cancel.cancel();
        assert!(matches!(ensure_active(&cancel), Err(StoreError::Cancelled)));
    }
}
