//! The global store adapter contract.

use crate::adapter::AdapterKind;
use crate::error::StoreResult;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

/// Value written and read back by [`GlobalStore::test_connection`].
const PROBE_VALUE: &str = "filebot_probe";

/// Four-state existence probe for a global node (`$DATA`).
///
/// Whether a node holds a scalar and whether it has children are
/// independent facts in a sparse tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataState {
    /// Neither a value nor descendants (0).
    Undefined,
    /// A value but no descendants (1).
    ValueOnly,
    /// Descendants but no value (10).
    DescendantsOnly,
    /// Both a value and descendants (11).
    Both,
}

impl DataState {
    /// Builds a state from the two underlying facts.
    #[must_use]
    pub const fn from_flags(has_value: bool, has_descendants: bool) -> Self {
        match (has_value, has_descendants) {
            (false, false) => Self::Undefined,
            (true, false) => Self::ValueOnly,
            (false, true) => Self::DescendantsOnly,
            (true, true) => Self::Both,
        }
    }

    /// Parses the numeric `$DATA` code (0, 1, 10, 11).
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Undefined),
            1 => Some(Self::ValueOnly),
            10 => Some(Self::DescendantsOnly),
            11 => Some(Self::Both),
            _ => None,
        }
    }

    /// Returns the numeric `$DATA` code: +1 for a value, +10 for descendants.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Undefined => 0,
            Self::ValueOnly => 1,
            Self::DescendantsOnly => 10,
            Self::Both => 11,
        }
    }

    /// Returns true if the node holds a scalar value.
    #[must_use]
    pub const fn has_value(self) -> bool {
        matches!(self, Self::ValueOnly | Self::Both)
    }

    /// Returns true if the node has at least one child.
    #[must_use]
    pub const fn has_descendants(self) -> bool {
        matches!(self, Self::DescendantsOnly | Self::Both)
    }

    /// Returns true if the node exists in any form.
    #[must_use]
    pub const fn exists(self) -> bool {
        !matches!(self, Self::Undefined)
    }
}

/// Outcome of a capability-gated operation.
///
/// `Unsupported` means the backend lacks the capability and nothing
/// happened. Callers that want the legacy "pretend it worked" behavior
/// ask for it explicitly with [`Support::degraded_or`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Support<T> {
    /// The backend performed the operation.
    Native(T),
    /// The backend does not have this capability.
    Unsupported,
}

impl<T> Support<T> {
    /// Returns true if the backend performed the operation.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native(_))
    }

    /// Returns the native result, if any.
    pub fn native(self) -> Option<T> {
        match self {
            Self::Native(value) => Some(value),
            Self::Unsupported => None,
        }
    }

    /// Returns the native result, or `fallback` when unsupported.
    pub fn degraded_or(self, fallback: T) -> T {
        self.native().unwrap_or(fallback)
    }

    /// Maps the native result.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Support<U> {
        match self {
            Self::Native(value) => Support::Native(f(value)),
            Self::Unsupported => Support::Unsupported,
        }
    }
}

/// Capability flags a backend reports so callers can branch on degraded
/// support instead of probing by trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Begin/commit/rollback are real.
    pub transactions: bool,
    /// Lock/unlock are real.
    pub locking: bool,
    /// Native code execution is available.
    pub raw_execute: bool,
    /// Safe to share across threads and processes.
    pub concurrent_access: bool,
    /// Cross-reference maintenance is meaningful on this backend.
    pub cross_references: bool,
    /// Subscripts and values may hold non-ASCII text.
    pub unicode: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            transactions: false,
            locking: false,
            raw_execute: false,
            concurrent_access: true,
            cross_references: true,
            unicode: false,
        }
    }
}

impl Capabilities {
    /// Creates the baseline capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets transaction support.
    #[must_use]
    pub const fn transactions(mut self, value: bool) -> Self {
        self.transactions = value;
        self
    }

    /// Sets locking support.
    #[must_use]
    pub const fn locking(mut self, value: bool) -> Self {
        self.locking = value;
        self
    }

    /// Sets raw-execute support.
    #[must_use]
    pub const fn raw_execute(mut self, value: bool) -> Self {
        self.raw_execute = value;
        self
    }

    /// Sets concurrent access support.
    #[must_use]
    pub const fn concurrent_access(mut self, value: bool) -> Self {
        self.concurrent_access = value;
        self
    }

    /// Sets unicode support.
    #[must_use]
    pub const fn unicode(mut self, value: bool) -> Self {
        self.unicode = value;
        self
    }
}

/// Adapter and backend version strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Version of the adapter code.
    pub adapter_version: String,
    /// Version reported by the backend, or `"unknown"`.
    pub backend_version: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            adapter_version: crate::VERSION.to_string(),
            backend_version: "unknown".to_string(),
        }
    }
}

/// Result of a round-trip connection test.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    /// Whether the write/read/cleanup round trip succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Round-trip latency, when the test got that far.
    pub latency: Option<Duration>,
    /// When the test finished.
    pub checked_at: SystemTime,
}

impl ConnectionResult {
    /// Creates a successful result.
    pub fn success(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: true,
            message: message.into(),
            latency: Some(latency),
            checked_at: SystemTime::now(),
        }
    }

    /// Creates a failed result.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            latency: None,
            checked_at: SystemTime::now(),
        }
    }
}

/// Handle for a backend transaction.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    level: u32,
    started_at: Instant,
    completed: bool,
}

impl Transaction {
    /// Creates a handle for transaction `id` at nesting `level`.
    #[must_use]
    pub fn new(id: u64, level: u32) -> Self {
        Self {
            id,
            level,
            started_at: Instant::now(),
            completed: false,
        }
    }

    /// Returns the backend transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the nesting level this handle was opened at (1 = outermost).
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Returns when the handle was opened.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns true once committed or rolled back.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Marks the handle as finished.
    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// The minimal capability interface every backend satisfies.
///
/// Paths are a global name (with or without a leading `^`) plus an ordered
/// list of string subscripts. All operations may fail with a connection
/// error when the backend is unreachable; "not found" is never an error.
///
/// # Optional capabilities
///
/// `lock`, `unlock`, the transaction methods and `execute` default to
/// [`Support::Unsupported`]. Backends that implement them also report the
/// matching flag from [`GlobalStore::capabilities`].
pub trait GlobalStore: Send + Sync {
    /// Returns which backend this is.
    fn adapter_kind(&self) -> AdapterKind;

    /// Returns the scalar stored at the exact path, if any.
    fn get(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>>;

    /// Writes the scalar at the exact path, creating intermediate nodes.
    fn set(&self, value: &str, global: &str, subscripts: &[&str]) -> StoreResult<()>;

    /// Removes the node and all of its descendants.
    fn kill(&self, global: &str, subscripts: &[&str]) -> StoreResult<()>;

    /// Returns the next subscript at the level of the last subscript.
    ///
    /// The last subscript is the current position; an empty string means
    /// "before the first". Returns `None` when there is no successor.
    fn order(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>>;

    /// Returns the previous subscript at the level of the last subscript.
    ///
    /// An empty last subscript means "after the last".
    fn order_reverse(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>>;

    /// Probes whether the node has a value, descendants, both, or neither.
    fn data(&self, global: &str, subscripts: &[&str]) -> StoreResult<DataState>;

    /// Returns the backend's capability flags.
    fn capabilities(&self) -> Capabilities;

    /// Returns version information.
    fn version_info(&self) -> VersionInfo {
        VersionInfo::default()
    }

    /// Returns true if the store has not been closed.
    fn is_connected(&self) -> bool;

    /// Closes the store. Later operations fail with a connection error.
    fn close(&self) -> StoreResult<()>;

    /// Acquires an incremental lock on a node and its subtree.
    ///
    /// Returns `Native(false)` when the timeout elapsed.
    fn lock(
        &self,
        _global: &str,
        _subscripts: &[&str],
        _timeout: Duration,
    ) -> StoreResult<Support<bool>> {
        Ok(Support::Unsupported)
    }

    /// Releases one level of a lock. Returns `Native(false)` if it was not held.
    fn unlock(&self, _global: &str, _subscripts: &[&str]) -> StoreResult<Support<bool>> {
        Ok(Support::Unsupported)
    }

    /// Starts (or nests) a transaction.
    fn begin_transaction(&self) -> StoreResult<Support<Transaction>> {
        Ok(Support::Unsupported)
    }

    /// Commits one level of a transaction.
    fn commit_transaction(&self, _txn: &mut Transaction) -> StoreResult<Support<()>> {
        Ok(Support::Unsupported)
    }

    /// Rolls back the whole transaction.
    fn rollback_transaction(&self, _txn: &mut Transaction) -> StoreResult<Support<()>> {
        Ok(Support::Unsupported)
    }

    /// Runs native code on the backend.
    fn execute(&self, _code: &str) -> StoreResult<Support<String>> {
        Ok(Support::Unsupported)
    }

    /// Performs a real write + read + cleanup against a scratch global.
    ///
    /// This is the only way to tell "constructed" from "reachable".
    fn test_connection(&self) -> ConnectionResult {
        if !self.is_connected() {
            return ConnectionResult::failure("adapter not connected");
        }

        let scratch = format!("FILEBOT_TEST_{}", Uuid::new_v4().simple());
        let started = Instant::now();
        let round_trip = || -> StoreResult<Option<String>> {
            self.set(PROBE_VALUE, &scratch, &["connection"])?;
            let read = self.get(&scratch, &["connection"])?;
            self.kill(&scratch, &[])?;
            Ok(read)
        };

        match round_trip() {
            Ok(Some(value)) if value == PROBE_VALUE => {
                let latency = started.elapsed();
                ConnectionResult::success(
                    format!("connection successful (latency: {}us)", latency.as_micros()),
                    latency,
                )
            }
            Ok(_) => {
                let _ = self.kill(&scratch, &[]);
                ConnectionResult::failure("global operation test failed")
            }
            Err(e) => {
                let _ = self.kill(&scratch, &[]);
                ConnectionResult::failure(format!("connection test failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_state_codes() {
        for state in [
            DataState::Undefined,
            DataState::ValueOnly,
            DataState::DescendantsOnly,
            DataState::Both,
        ] {
            assert_eq!(DataState::from_code(state.code()), Some(state));
        }
        assert_eq!(DataState::from_code(2), None);
        assert_eq!(DataState::from_flags(true, true).code(), 11);
        assert!(DataState::DescendantsOnly.has_descendants());
        assert!(!DataState::DescendantsOnly.has_value());
    }

    #[test]
    fn support_degraded_fallback() {
        let s: Support<bool> = Support::Unsupported;
        assert!(!s.is_native());
        assert!(s.degraded_or(true));
        assert_eq!(Support::Native(3).map(|v| v * 2), Support::Native(6));
    }

    #[test]
    fn capability_builder() {
        let caps = Capabilities::new().transactions(true).locking(true);
        assert!(caps.transactions);
        assert!(caps.locking);
        assert!(!caps.raw_execute);
        assert!(caps.cross_references);
    }
}
