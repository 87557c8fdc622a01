//! CLI error type.

use filebot_core::{DateError, FileBotError};
use filebot_storage::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by the `filebot` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// A store command was run without `--path`.
    #[error("journal path required for {command}")]
    MissingPath {
        /// The subcommand.
        command: &'static str,
    },

    /// The journal file does not exist.
    #[error("no journal found at {}", .0.display())]
    NoJournal(PathBuf),

    /// An argument could not be parsed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Verification found differences.
    #[error("cross-references inconsistent: {missing} missing, {stale} stale")]
    Inconsistent {
        /// Entries implied by records but absent.
        missing: usize,
        /// Entries no record supports.
        stale: usize,
    },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Orchestrator failure.
    #[error(transparent)]
    FileBot(#[from] FileBotError),

    /// Date conversion failure.
    #[error(transparent)]
    Date(#[from] DateError),

    /// JSON output failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
