//! In-memory global store.

use crate::adapter::AdapterKind;
use crate::error::{StoreError, StoreResult};
use crate::locks::{lock_path, LockTable};
use crate::store::{Capabilities, DataState, GlobalStore, Support, Transaction, VersionInfo};
use crate::subscript::{check_subscripts, normalize_global_name, split_order_path};
use crate::tree::{GlobalTree, Node};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Undo record captured while a transaction is open.
#[derive(Debug)]
enum Undo {
    Value {
        global: String,
        subscripts: Vec<String>,
        previous: Option<String>,
    },
    Subtree {
        global: String,
        subscripts: Vec<String>,
        previous: Option<Node>,
    },
}

#[derive(Debug)]
struct ActiveTxn {
    id: u64,
    level: u32,
    undo: Vec<Undo>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tree: GlobalTree,
    txn: Option<ActiveTxn>,
    next_txn_id: u64,
}

/// An in-memory global store.
///
/// Suitable for tests, fixtures, and ephemeral data. Supports locking and
/// nestable transactions (rolled back through an undo log); it does not
/// execute native code.
///
/// # Transactions
///
/// A transaction is store-wide: while one is open, every write through this
/// store is recorded in its undo log regardless of which thread made it.
///
/// # Example
///
/// ```rust
/// use filebot_storage::{GlobalStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.set("SMITH,JOHN", "^DPT", &["1", ".01"]).unwrap();
/// assert_eq!(store.get("DPT", &["1", ".01"]).unwrap().as_deref(), Some("SMITH,JOHN"));
/// assert_eq!(store.order("DPT", &[""]).unwrap().as_deref(), Some("1"));
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
    locks: LockTable,
    open: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            locks: LockTable::new(),
            open: AtomicBool::new(true),
        }
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all globals that currently hold data.
    #[must_use]
    pub fn global_names(&self) -> Vec<String> {
        self.state.read().tree.global_names()
    }

    /// Returns every (subscripts, value) pair under a global.
    pub fn entries(&self, global: &str) -> StoreResult<Vec<(Vec<String>, String)>> {
        let global = normalize_global_name(global)?;
        Ok(self.state.read().tree.entries(global))
    }

    /// Returns the current transaction nesting level (0 = none).
    #[must_use]
    pub fn transaction_level(&self) -> u32 {
        self.state.read().txn.as_ref().map_or(0, |t| t.level)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }

    fn order_impl(
        &self,
        global: &str,
        subscripts: &[&str],
        reverse: bool,
    ) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        let (parent, current) = split_order_path(subscripts)?;
        Ok(self.state.read().tree.order(global, parent, current, reverse))
    }
}

fn owned(subscripts: &[&str]) -> Vec<String> {
    subscripts.iter().map(|s| s.to_string()).collect()
}

impl GlobalStore for InMemoryStore {
    fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    fn get(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;
        Ok(self
            .state
            .read()
            .tree
            .get(global, subscripts)
            .map(str::to_string))
    }

    fn set(&self, value: &str, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;

        let mut guard = self.state.write();
        let state = &mut *guard;
        let previous = state.tree.set(global, subscripts, value);
        if let Some(txn) = state.txn.as_mut() {
            txn.undo.push(Undo::Value {
                global: global.to_string(),
                subscripts: owned(subscripts),
                previous,
            });
        }
        Ok(())
    }

    fn kill(&self, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;

        let mut guard = self.state.write();
        let state = &mut *guard;
        let previous = state.tree.kill(global, subscripts);
        if let Some(txn) = state.txn.as_mut() {
            txn.undo.push(Undo::Subtree {
                global: global.to_string(),
                subscripts: owned(subscripts),
                previous,
            });
        }
        Ok(())
    }

    fn order(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.order_impl(global, subscripts, false)
    }

    fn order_reverse(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.order_impl(global, subscripts, true)
    }

    fn data(&self, global: &str, subscripts: &[&str]) -> StoreResult<DataState> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;
        Ok(self.state.read().tree.data(global, subscripts))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
            .transactions(true)
            .locking(true)
            .unicode(true)
    }

    fn version_info(&self) -> VersionInfo {
        VersionInfo {
            adapter_version: crate::VERSION.to_string(),
            backend_version: "memory".to_string(),
        }
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> StoreResult<()> {
        self.open.store(false, Ordering::Release);
        self.locks.clear();
        Ok(())
    }

    fn lock(
        &self,
        global: &str,
        subscripts: &[&str],
        timeout: Duration,
    ) -> StoreResult<Support<bool>> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;
        Ok(Support::Native(
            self.locks.acquire(lock_path(global, subscripts), timeout),
        ))
    }

    fn unlock(&self, global: &str, subscripts: &[&str]) -> StoreResult<Support<bool>> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;
        Ok(Support::Native(
            self.locks.release(&lock_path(global, subscripts)),
        ))
    }

    fn begin_transaction(&self) -> StoreResult<Support<Transaction>> {
        self.ensure_open()?;
        let mut state = self.state.write();
        let (id, level) = match state.txn.as_mut() {
            Some(txn) => {
                txn.level += 1;
                (txn.id, txn.level)
            }
            None => {
                state.next_txn_id += 1;
                let id = state.next_txn_id;
                state.txn = Some(ActiveTxn {
                    id,
                    level: 1,
                    undo: Vec::new(),
                });
                (id, 1)
            }
        };
        debug!(txn = id, level, "transaction started");
        Ok(Support::Native(Transaction::new(id, level)))
    }

    fn commit_transaction(&self, txn: &mut Transaction) -> StoreResult<Support<()>> {
        self.ensure_open()?;
        if txn.is_completed() {
            return Err(StoreError::transaction("transaction already completed"));
        }

        let mut state = self.state.write();
        let active = match state.txn.as_mut() {
            Some(active) if active.id == txn.id() => active,
            _ => return Err(StoreError::transaction("no matching transaction is open")),
        };

        if active.level > 1 {
            active.level -= 1;
        } else {
            state.txn = None;
        }
        txn.mark_completed();
        debug!(txn = txn.id(), "transaction committed");
        Ok(Support::Native(()))
    }

    fn rollback_transaction(&self, txn: &mut Transaction) -> StoreResult<Support<()>> {
        self.ensure_open()?;
        if txn.is_completed() {
            return Err(StoreError::transaction("transaction already completed"));
        }

        let mut guard = self.state.write();
        let state = &mut *guard;
        let active = match state.txn.take() {
            Some(active) if active.id == txn.id() => active,
            other => {
                state.txn = other;
                return Err(StoreError::transaction("no matching transaction is open"));
            }
        };

        let undone = active.undo.len();
        for undo in active.undo.into_iter().rev() {
            match undo {
                Undo::Value {
                    global,
                    subscripts,
                    previous,
                } => {
                    let subs: Vec<&str> = subscripts.iter().map(String::as_str).collect();
                    match previous {
                        Some(value) => {
                            state.tree.set(&global, &subs, &value);
                        }
                        None => {
                            state.tree.clear_value(&global, &subs);
                        }
                    }
                }
                Undo::Subtree {
                    global,
                    subscripts,
                    previous,
                } => {
                    let subs: Vec<&str> = subscripts.iter().map(String::as_str).collect();
                    state.tree.restore(&global, &subs, previous);
                }
            }
        }
        txn.mark_completed();
        debug!(txn = txn.id(), undone, "transaction rolled back");
        Ok(Support::Native(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_is_not_an_error() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("DPT", &["1", ".01"]).unwrap(), None);
        assert_eq!(store.data("DPT", &["1"]).unwrap(), DataState::Undefined);
        assert_eq!(store.order("DPT", &[""]).unwrap(), None);
    }

    #[test]
    fn empty_value_is_a_value() {
        let store = InMemoryStore::new();
        store.set("", "DPT", &["B", "SMITH,JOHN", "1"]).unwrap();
        assert_eq!(
            store.get("DPT", &["B", "SMITH,JOHN", "1"]).unwrap().as_deref(),
            Some("")
        );
        assert_eq!(
            store.data("DPT", &["B", "SMITH,JOHN"]).unwrap(),
            DataState::DescendantsOnly
        );
    }

    #[test]
    fn null_subscript_rejected() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.set("x", "DPT", &["1", ""]),
            Err(StoreError::InvalidSubscripts { .. })
        ));
        assert!(matches!(
            store.order("DPT", &[]),
            Err(StoreError::InvalidSubscripts { .. })
        ));
    }

    #[test]
    fn caret_is_optional() {
        let store = InMemoryStore::new();
        store.set("1", "^DPT", &["0"]).unwrap();
        assert_eq!(store.get("DPT", &["0"]).unwrap().as_deref(), Some("1"));
        assert_eq!(store.global_names(), vec!["DPT".to_string()]);
    }

    #[test]
    fn kill_removes_descendants() {
        let store = InMemoryStore::new();
        store.set("SMITH,JOHN", "DPT", &["1", ".01"]).unwrap();
        store.set("M", "DPT", &["1", ".02"]).unwrap();
        store.kill("DPT", &["1"]).unwrap();
        assert_eq!(store.data("DPT", &["1"]).unwrap(), DataState::Undefined);
    }

    #[test]
    fn closed_store_reports_disconnected() {
        let store = InMemoryStore::new();
        store.close().unwrap();
        assert!(!store.is_connected());
        assert!(matches!(
            store.get("DPT", &["1"]),
            Err(StoreError::Disconnected)
        ));
        assert!(!store.test_connection().success);
    }

    #[test]
    fn test_connection_round_trip_leaves_no_trace() {
        let store = InMemoryStore::new();
        let result = store.test_connection();
        assert!(result.success, "{}", result.message);
        assert!(result.latency.is_some());
        assert!(store.global_names().is_empty());
    }

    #[test]
    fn rollback_restores_prior_state() {
        let store = InMemoryStore::new();
        store.set("SMITH,JOHN", "DPT", &["1", ".01"]).unwrap();

        let mut txn = store.begin_transaction().unwrap().native().unwrap();
        store.set("SMITH,JON", "DPT", &["1", ".01"]).unwrap();
        store.set("M", "DPT", &["1", ".02"]).unwrap();
        store.kill("DPT", &["1", ".01"]).unwrap();
        store.set("DOE,JANE", "DPT", &["2", ".01"]).unwrap();
        store.rollback_transaction(&mut txn).unwrap();

        assert!(txn.is_completed());
        assert_eq!(
            store.get("DPT", &["1", ".01"]).unwrap().as_deref(),
            Some("SMITH,JOHN")
        );
        assert_eq!(store.get("DPT", &["1", ".02"]).unwrap(), None);
        assert_eq!(store.data("DPT", &["2"]).unwrap(), DataState::Undefined);
        assert_eq!(store.transaction_level(), 0);
    }

    #[test]
    fn nested_commit_keeps_outer_open() {
        let store = InMemoryStore::new();
        let mut outer = store.begin_transaction().unwrap().native().unwrap();
        let mut inner = store.begin_transaction().unwrap().native().unwrap();
        assert_eq!(inner.level(), 2);

        store.set("A", "X", &["1"]).unwrap();
        store.commit_transaction(&mut inner).unwrap();
        assert_eq!(store.transaction_level(), 1);

        store.rollback_transaction(&mut outer).unwrap();
        assert_eq!(store.get("X", &["1"]).unwrap(), None);
    }

    #[test]
    fn completed_handle_rejected() {
        let store = InMemoryStore::new();
        let mut txn = store.begin_transaction().unwrap().native().unwrap();
        store.commit_transaction(&mut txn).unwrap();
        assert!(store.commit_transaction(&mut txn).is_err());
    }

    #[test]
    fn lock_and_unlock_are_native() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.lock("DPT", &["1"], Duration::ZERO).unwrap(),
            Support::Native(true)
        );
        assert_eq!(store.unlock("DPT", &["1"]).unwrap(), Support::Native(true));
        assert_eq!(store.unlock("DPT", &["1"]).unwrap(), Support::Native(false));
    }

    #[test]
    fn execute_is_unsupported() {
        let store = InMemoryStore::new();
        assert_eq!(store.execute("W 1").unwrap(), Support::Unsupported);
        assert!(!store.capabilities().raw_execute);
    }
}
