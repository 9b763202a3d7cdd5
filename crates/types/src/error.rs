//! Machine-readable error codes.
//!
//! Each error variant raised by the store maps to an [`ErrorCode`] with a
//! unique numeric identifier, retryability classification, and suggested
//! recovery action. Codes are organized into ranges:
//!
//! | Range       | Domain      | Examples                                  |
//! |-------------|-------------|-------------------------------------------|
//! | 1000–1099   | Storage     | Database open, transaction, table ops     |
//! | 1100–1199   | Storage I/O | Corruption, encoding                      |
//! | 3000–3099   | Records     | Not found, already exists, index conflict |
//! | 3100–3199   | Requests    | Invalid input, forbidden, expired         |
//! | 3200–3299   | Lifecycle   | Cancellation, internal                    |

use core::fmt;

/// Machine-readable error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Storage errors (1000–1199) ---
    /// Database file could not be opened.
    StorageDatabaseOpen = 1000,
    /// Transaction begin or commit failed.
    StorageTransaction = 1001,
    /// Table operation failed.
    StorageTableOperation = 1002,
    /// Stored bytes could not be decoded or a value could not be encoded.
    StorageSerialization = 1100,
    /// Stored data violates a key layout invariant.
    StorageCorruption = 1101,

    // --- Record errors (3000–3099) ---
    /// Record absent or tombstoned.
    RecordNotFound = 3000,
    /// Primary key already present.
    RecordAlreadyExists = 3001,
    /// Unique index value claimed by another record.
    IndexConflict = 3002,

    // --- Request errors (3100–3199) ---
    /// Malformed cursor or out-of-range argument.
    InvalidInput = 3100,
    /// Caller lacks permission.
    Forbidden = 3101,
    /// Session lifetime elapsed.
    SessionExpired = 3102,

    // --- Lifecycle errors (3200–3299) ---
    /// Caller cancelled the operation.
    Cancelled = 3200,
    /// Unexpected state.
    Internal = 3201,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::StorageDatabaseOpen),
            1001 => Some(Self::StorageTransaction),
            1002 => Some(Self::StorageTableOperation),
            1100 => Some(Self::StorageSerialization),
            1101 => Some(Self::StorageCorruption),
            3000 => Some(Self::RecordNotFound),
            3001 => Some(Self::RecordAlreadyExists),
            3002 => Some(Self::IndexConflict),
            3100 => Some(Self::InvalidInput),
            3101 => Some(Self::Forbidden),
            3102 => Some(Self::SessionExpired),
            3200 => Some(Self::Cancelled),
            3201 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether this error is retryable.
    ///
    /// Retryable errors may succeed on a subsequent attempt, typically after
    /// backoff. Non-retryable errors require corrective action before retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StorageTransaction | Self::StorageTableOperation)
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::StorageDatabaseOpen => {
                "Verify the database path exists with correct permissions and is not opened by another process."
            },
            Self::StorageTransaction => "Retry the operation with backoff.",
            Self::StorageTableOperation => {
                "Retry the operation. Check disk space and I/O health if the error persists."
            },
            Self::StorageSerialization => {
                "Codec bug or data corruption. Report as an issue with the record type involved."
            },
            Self::StorageCorruption => "Restore from the most recent backup.",
            Self::RecordNotFound => "Verify the identifier. Deleted records are not returned.",
            Self::RecordAlreadyExists => "Use a fresh identifier or update the existing record.",
            Self::IndexConflict => "Choose a different value for the unique field.",
            Self::InvalidInput => "Fix the request parameters and resubmit.",
            Self::Forbidden => "Request access from the owner of the resource.",
            Self::SessionExpired => "Sign in again to obtain a new session.",
            Self::Cancelled => "The caller cancelled the request. Resubmit if still needed.",
            Self::Internal => "Unexpected state. Collect context and report as an issue.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}
