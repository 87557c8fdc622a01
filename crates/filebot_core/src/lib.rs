//! # FileBot Core
//!
//! A FileMan-compatible data access layer over any [`GlobalStore`].
//!
//! This crate provides:
//! - A field dictionary describing entities, fields and record rules
//! - External/internal value transforms
//! - Validation that reports every failure at once
//! - Cross-reference maintenance, lookup and repair
//! - The FileMan internal date format and date arithmetic
//! - A CRUD orchestrator ([`FileBot`]) with locking, retries and optional
//!   transactional writes
//!
//! ## Storage layout
//!
//! ```text
//! ^DPT(0)                    = "PATIENT^2^<last ien>^<count>"
//! ^DPT(ien, field)           = internal value
//! ^DPT(xref, VALUE, ien)     = ""
//! ```
//!
//! ## Example
//!
//! ```rust
//! use filebot_core::FileBot;
//! use filebot_storage::{GlobalStore, InMemoryStore};
//!
//! let bot = FileBot::new(InMemoryStore::new())?;
//! let ien = bot.create("PATIENT", &[(".01", "SMITH,JOHN"), (".03", "2850101")])?;
//!
//! let store = bot.store();
//! assert_eq!(store.order("DPT", &["B", "SMITH,JOHN", ""])?.as_deref(), Some(ien.as_str()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`GlobalStore`]: filebot_storage::GlobalStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod date;
mod dictionary;
mod error;
mod filebot;
mod gateway;
mod retry;
mod stats;
mod transform;
mod validation;
mod xref;

pub use config::FileBotConfig;
pub use date::{DateError, DateResult, DateStyle, FileManDate, YearPivot};
pub use dictionary::{
    canonical_field_id, hospital_location, patient, Dictionary, DictionaryBuilder,
    DictionaryError, EntityDefinition, FieldDefinition, FieldType, FieldValidator, FieldValues,
    IdentifierKind, RecordRule, TransformId, FALLBACK_MAX_LENGTH, MAX_AGE_YEARS, NAME_FIELD,
};
pub use error::{ErrorCategory, ErrorCode, ErrorReport, FieldError, FileBotError, FileBotResult};
pub use filebot::{
    FieldFormat, FieldView, FileBot, ListEntry, LockStatus, RecordLock, RecordView,
    HEADER_SUBSCRIPT,
};
pub use gateway::{is_ien, Gateway};
pub use retry::RetryPolicy;
pub use stats::{OperationStats, StatsSnapshot};
pub use transform::{format_identifier, normalize_name, strip_separators, Transformer};
pub use validation::{merge_values, UniquenessProbe, ValidationResult, Validator};
pub use xref::{
    index_key, CrossReferenceIndex, PrefixMatches, XrefEntry, XrefHit, XrefMatches, XrefReport,
};
