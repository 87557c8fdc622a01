//! Error taxonomy for FileBot operations.

use crate::date::DateError;
use crate::dictionary::DictionaryError;
use filebot_storage::StoreError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for FileBot operations.
pub type FileBotResult<T> = Result<T, FileBotError>;

/// The five error categories exposed upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Backend unreachable or lost.
    Connection,
    /// Bad input; fixable by the caller.
    Validation,
    /// Access refused by the backend.
    Authentication,
    /// Not found, duplicate, lock timeout.
    Data,
    /// Unexpected backend or runtime fault.
    System,
}

impl ErrorCategory {
    /// Returns the category digit used in error codes.
    #[must_use]
    pub const fn digit(self) -> u8 {
        match self {
            Self::Connection => 1,
            Self::Validation => 2,
            Self::Authentication => 3,
            Self::Data => 4,
            Self::System => 5,
        }
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Data => "data",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stable machine-readable error code: `FB`, a category digit, and a
/// three-digit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ErrorCode(&'static str);

impl ErrorCode {
    /// Backend unreachable.
    pub const UNREACHABLE: Self = Self("FB1001");
    /// Store closed or connection lost.
    pub const DISCONNECTED: Self = Self("FB1002");

    /// Required field is empty.
    pub const REQUIRED: Self = Self("FB2001");
    /// Value does not match the field type.
    pub const INVALID_TYPE: Self = Self("FB2002");
    /// Value exceeds the maximum length.
    pub const TOO_LONG: Self = Self("FB2003");
    /// Value does not match the field pattern.
    pub const PATTERN_MISMATCH: Self = Self("FB2004");
    /// A custom validator rejected the value.
    pub const CUSTOM_RULE: Self = Self("FB2005");
    /// A cross-field rule failed.
    pub const CROSS_FIELD: Self = Self("FB2006");
    /// The value is not a valid date.
    pub const INVALID_DATE: Self = Self("FB2007");

    /// The backend refused access.
    pub const ACCESS_DENIED: Self = Self("FB3001");

    /// Record does not exist.
    pub const NOT_FOUND: Self = Self("FB4001");
    /// A unique value is already owned by another record.
    pub const DUPLICATE: Self = Self("FB4002");
    /// A record lock could not be acquired in time.
    pub const LOCK_TIMEOUT: Self = Self("FB4003");
    /// The record id is not a positive integer.
    pub const INVALID_ID: Self = Self("FB4004");
    /// The entity id names no modeled entity and is not a global name.
    pub const UNKNOWN_ENTITY: Self = Self("FB4005");

    /// Unexpected backend fault.
    pub const BACKEND_FAULT: Self = Self("FB5001");
    /// Retries were exhausted.
    pub const RETRY_EXHAUSTED: Self = Self("FB5002");
    /// The backend lacks a required capability.
    pub const UNSUPPORTED: Self = Self("FB5003");
    /// The field dictionary is malformed.
    pub const DICTIONARY: Self = Self("FB5004");

    /// Returns the code text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }

    /// Returns the category encoded in the code's first digit.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self.0.as_bytes().get(2) {
            Some(b'1') => ErrorCategory::Connection,
            Some(b'2') => ErrorCategory::Validation,
            Some(b'3') => ErrorCategory::Authentication,
            Some(b'4') => ErrorCategory::Data,
            _ => ErrorCategory::System,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// One itemized validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field number, or the rule name for cross-field failures.
    pub field: String,
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.code, self.message)
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur during FileBot operations.
#[derive(Debug, Error)]
pub enum FileBotError {
    /// The backend could not be reached.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
        /// True if the store was closed rather than unreachable.
        closed: bool,
    },

    /// The backend refused access.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// One or more fields failed validation. Nothing was written.
    #[error("validation failed for {entity}: {}", join_errors(.errors))]
    Validation {
        /// Entity type.
        entity: String,
        /// Record id, when updating.
        ien: Option<String>,
        /// Every failure found.
        errors: Vec<FieldError>,
    },

    /// A date could not be decoded or parsed.
    #[error(transparent)]
    Date(#[from] DateError),

    /// The record does not exist.
    #[error("record {ien} not found in {entity}")]
    NotFound {
        /// Entity type.
        entity: String,
        /// Record id.
        ien: String,
    },

    /// A record lock could not be acquired.
    #[error("lock timeout after {timeout:?} on {entity} record {ien}")]
    LockTimeout {
        /// Entity type.
        entity: String,
        /// Record id.
        ien: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The record id is not a positive integer.
    #[error("invalid record id {ien:?} for {entity}")]
    InvalidId {
        /// Entity type.
        entity: String,
        /// Offending id.
        ien: String,
    },

    /// The entity id is neither modeled nor usable as a global name.
    #[error("unknown entity {0:?}")]
    UnknownEntity(String),

    /// The field dictionary failed to build.
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    /// Unexpected backend fault.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the fault.
        message: String,
    },

    /// An operation failed on every allowed attempt.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Name of the operation.
        operation: String,
        /// Attempts made.
        attempts: u32,
        /// The last failure.
        source: Box<FileBotError>,
    },

    /// The backend lacks a required capability.
    #[error("unsupported by backend: {capability}")]
    Unsupported {
        /// Name of the missing capability.
        capability: String,
    },
}

impl FileBotError {
    /// Creates a backend fault.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(entity: impl Into<String>, ien: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            ien: ien.into(),
        }
    }

    /// Creates a validation error from a non-empty list of failures.
    pub fn validation(
        entity: impl Into<String>,
        ien: Option<String>,
        errors: Vec<FieldError>,
    ) -> Self {
        Self::Validation {
            entity: entity.into(),
            ien,
            errors,
        }
    }

    /// Returns the stable machine-readable code.
    ///
    /// A validation error reports the code of its first failure, so a
    /// rejection caused only by a duplicate unique value is a data error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection { closed: false, .. } => ErrorCode::UNREACHABLE,
            Self::Connection { closed: true, .. } => ErrorCode::DISCONNECTED,
            Self::AccessDenied(_) => ErrorCode::ACCESS_DENIED,
            Self::Validation { errors, .. } => errors
                .first()
                .map_or(ErrorCode::CUSTOM_RULE, |e| e.code),
            Self::Date(_) => ErrorCode::INVALID_DATE,
            Self::NotFound { .. } => ErrorCode::NOT_FOUND,
            Self::LockTimeout { .. } => ErrorCode::LOCK_TIMEOUT,
            Self::InvalidId { .. } => ErrorCode::INVALID_ID,
            Self::UnknownEntity(_) => ErrorCode::UNKNOWN_ENTITY,
            Self::Dictionary(_) => ErrorCode::DICTIONARY,
            Self::Backend { .. } => ErrorCode::BACKEND_FAULT,
            Self::RetryExhausted { .. } => ErrorCode::RETRY_EXHAUSTED,
            Self::Unsupported { .. } => ErrorCode::UNSUPPORTED,
        }
    }

    /// Returns the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Returns true if retrying the same call might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { closed, .. } => !closed,
            Self::LockTimeout { .. } => true,
            Self::Backend { message } => {
                let lower = message.to_ascii_lowercase();
                lower.contains("timeout")
                    || lower.contains("timed out")
                    || lower.contains("unavailable")
            }
            _ => false,
        }
    }

    /// Returns the validation failures, if this is a validation error.
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Builds the structured shape exposed to callers.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        let (entity_type, record_id, field) = match self {
            Self::Validation { entity, ien, errors } => (
                Some(entity.clone()),
                ien.clone(),
                errors.first().map(|e| e.field.clone()),
            ),
            Self::NotFound { entity, ien }
            | Self::LockTimeout { entity, ien, .. }
            | Self::InvalidId { entity, ien } => (Some(entity.clone()), Some(ien.clone()), None),
            Self::UnknownEntity(entity) => (Some(entity.clone()), None, None),
            Self::RetryExhausted { source, .. } => {
                let inner = source.report();
                (inner.entity_type, inner.record_id, inner.field)
            }
            _ => (None, None, None),
        };
        ErrorReport {
            category: self.category(),
            code: self.code(),
            message: self.to_string(),
            field,
            record_id,
            entity_type,
            retryable: self.is_retryable(),
        }
    }
}

impl From<StoreError> for FileBotError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection { message } => Self::Connection {
                message,
                closed: false,
            },
            StoreError::Disconnected => Self::Connection {
                message: "store is closed".into(),
                closed: true,
            },
            StoreError::AccessDenied(message) => Self::AccessDenied(message),
            other => Self::backend(other.to_string()),
        }
    }
}

/// The error shape exposed upward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Error category.
    pub category: ErrorCategory,
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Offending field, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Record id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Entity type, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Whether the caller may retry.
    pub retryable: bool,
}
