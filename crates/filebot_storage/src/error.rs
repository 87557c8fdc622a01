//! Error types for global store operations.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for global store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during global store operations.
///
/// Absence of a node is never an error: reads return `Ok(None)` and
/// existence probes return [`crate::DataState::Undefined`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("backend unreachable: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// The store has been closed; no further operations are accepted.
    #[error("store is closed")]
    Disconnected,

    /// The backend refused access to its underlying resource.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The global name is empty or malformed.
    #[error("invalid global name: {0:?}")]
    InvalidGlobalName(String),

    /// The subscript list is not valid for the requested operation.
    #[error("invalid subscripts: {message}")]
    InvalidSubscripts {
        /// Description of the problem.
        message: String,
    },

    /// The persisted journal is corrupted.
    #[error("journal corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A lock could not be acquired within the timeout.
    #[error("lock timeout after {timeout:?} on {path}")]
    LockTimeout {
        /// Rendered global reference.
        path: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A transaction handle was used out of order.
    #[error("transaction error: {message}")]
    Transaction {
        /// Description of the problem.
        message: String,
    },

    /// The journal file is held by another process.
    #[error("journal locked: another process has exclusive access")]
    JournalLocked,

    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an invalid subscripts error.
    pub fn invalid_subscripts(message: impl Into<String>) -> Self {
        Self::InvalidSubscripts {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Returns true if the failure is about reaching the backend at all.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Disconnected)
    }

    /// Maps an I/O error, lifting permission failures into [`StoreError::AccessDenied`].
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::AccessDenied(err.to_string()),
            _ => Self::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_becomes_access_denied() {
        let err = StoreError::from_io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(err, StoreError::AccessDenied(_)));

        let err = StoreError::from_io(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn connection_classification() {
        assert!(StoreError::connection("refused").is_connection());
        assert!(StoreError::Disconnected.is_connection());
        assert!(!StoreError::JournalLocked.is_connection());
    }
}
