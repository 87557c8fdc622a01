//! Store calls with retry and error conversion.

use crate::error::{FileBotError, FileBotResult};
use crate::retry::RetryPolicy;
use filebot_storage::{
    is_canonical_number, render_reference, Capabilities, ConnectionResult, DataState, GlobalStore,
    Support, Transaction,
};
use std::time::Duration;

/// Wraps a [`GlobalStore`] so every call is retried per policy and every
/// failure is a [`FileBotError`].
#[derive(Debug)]
pub struct Gateway<S> {
    store: S,
    retry: RetryPolicy,
    traversal_cap: usize,
}

impl<S: GlobalStore> Gateway<S> {
    /// Wraps `store`.
    pub fn new(store: S, retry: RetryPolicy, traversal_cap: usize) -> Self {
        Self {
            store,
            retry,
            traversal_cap: traversal_cap.max(1),
        }
    }

    /// Returns the wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the gateway, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Reads the value at a path.
    pub fn get(&self, global: &str, subs: &[&str]) -> FileBotResult<Option<String>> {
        self.retry
            .run("get", || Ok(self.store.get(global, subs)?))
    }

    /// Writes the value at a path.
    pub fn set(&self, value: &str, global: &str, subs: &[&str]) -> FileBotResult<()> {
        self.retry
            .run("set", || Ok(self.store.set(value, global, subs)?))
    }

    /// Removes a node and its descendants.
    pub fn kill(&self, global: &str, subs: &[&str]) -> FileBotResult<()> {
        self.retry
            .run("kill", || Ok(self.store.kill(global, subs)?))
    }

    /// Next subscript at the last level of `subs`.
    pub fn order(&self, global: &str, subs: &[&str]) -> FileBotResult<Option<String>> {
        self.retry
            .run("order", || Ok(self.store.order(global, subs)?))
    }

    /// Previous subscript at the last level of `subs`.
    pub fn order_reverse(&self, global: &str, subs: &[&str]) -> FileBotResult<Option<String>> {
        self.retry
            .run("order_reverse", || Ok(self.store.order_reverse(global, subs)?))
    }

    /// Existence probe.
    pub fn data(&self, global: &str, subs: &[&str]) -> FileBotResult<DataState> {
        self.retry
            .run("data", || Ok(self.store.data(global, subs)?))
    }

    /// Acquires a lock on a path.
    pub fn lock(
        &self,
        global: &str,
        subs: &[&str],
        timeout: Duration,
    ) -> FileBotResult<Support<bool>> {
        self.retry
            .run("lock", || Ok(self.store.lock(global, subs, timeout)?))
    }

    /// Releases a lock on a path.
    pub fn unlock(&self, global: &str, subs: &[&str]) -> FileBotResult<Support<bool>> {
        self.retry
            .run("unlock", || Ok(self.store.unlock(global, subs)?))
    }

    /// Starts a backend transaction. Not retried.
    pub fn begin_transaction(&self) -> FileBotResult<Support<Transaction>> {
        Ok(self.store.begin_transaction()?)
    }

    /// Commits a backend transaction. Not retried.
    pub fn commit_transaction(&self, txn: &mut Transaction) -> FileBotResult<Support<()>> {
        Ok(self.store.commit_transaction(txn)?)
    }

    /// Rolls back a backend transaction. Not retried.
    pub fn rollback_transaction(&self, txn: &mut Transaction) -> FileBotResult<Support<()>> {
        Ok(self.store.rollback_transaction(txn)?)
    }

    /// Backend capabilities.
    pub fn capabilities(&self) -> Capabilities {
        self.store.capabilities()
    }

    /// Round-trips a scratch value through the backend.
    pub fn test_connection(&self) -> ConnectionResult {
        self.store.test_connection()
    }

    /// Collects the subscripts after `after` at the level below `parent`,
    /// up to `limit` of them.
    ///
    /// Fails if the backend hands back a subscript that does not advance,
    /// or if the walk exceeds the traversal cap.
    pub fn children(
        &self,
        global: &str,
        parent: &[&str],
        after: Option<&str>,
        limit: usize,
    ) -> FileBotResult<Vec<String>> {
        let mut out = Vec::new();
        self.walk(global, parent, after.unwrap_or(""), |sub| {
            if out.len() >= limit {
                return Ok(false);
            }
            out.push(sub.to_string());
            Ok(true)
        })?;
        Ok(out)
    }

    /// Walks subscripts after `start` under `parent`, calling `visit` for
    /// each until it returns `Ok(false)`, fails, or the level is exhausted.
    pub fn walk(
        &self,
        global: &str,
        parent: &[&str],
        start: &str,
        mut visit: impl FnMut(&str) -> FileBotResult<bool>,
    ) -> FileBotResult<()> {
        let mut current = start.to_string();
        for _ in 0..self.traversal_cap {
            let mut path: Vec<&str> = parent.to_vec();
            path.push(&current);
            let Some(next) = self.order(global, &path)? else {
                return Ok(());
            };
            if next == current {
                return Err(FileBotError::backend(format!(
                    "traversal stalled at {}",
                    render_reference(global, &path)
                )));
            }
            if !visit(&next)? {
                return Ok(());
            }
            current = next;
        }
        Err(FileBotError::backend(format!(
            "traversal of {} exceeded {} steps",
            render_reference(global, parent),
            self.traversal_cap
        )))
    }

    /// Returns the highest positive-integer subscript at the top level of
    /// a global.
    pub fn last_integer_subscript(&self, global: &str) -> FileBotResult<Option<u64>> {
        let mut current = String::new();
        for _ in 0..self.traversal_cap {
            let Some(prev) = self.order_reverse(global, &[current.as_str()])? else {
                return Ok(None);
            };
            if is_ien(&prev) {
                if let Ok(n) = prev.parse::<u64>() {
                    return Ok(Some(n));
                }
            }
            if is_canonical_number(&prev) && (prev.starts_with('-') || prev == "0") {
                return Ok(None);
            }
            current = prev;
        }
        Err(FileBotError::backend(format!(
            "reverse traversal of ^{global} exceeded {} steps",
            self.traversal_cap
        )))
    }
}

/// Returns true if `s` is a record id: a canonical positive integer.
#[must_use]
pub fn is_ien(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('0')
        && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filebot_storage::InMemoryStore;

    fn gateway() -> Gateway<InMemoryStore> {
        Gateway::new(InMemoryStore::new(), RetryPolicy::no_retry(), 1000)
    }

    #[test]
    fn children_in_collation_order() {
        let gw = gateway();
        for ien in ["10", "2", "1"] {
            gw.set("X", "DPT", &[ien, ".01"]).unwrap();
        }
        gw.set("", "DPT", &["B", "X", "1"]).unwrap();

        assert_eq!(gw.children("DPT", &[], None, 10).unwrap(), ["1", "2", "10", "B"]);
        assert_eq!(gw.children("DPT", &[], Some("2"), 10).unwrap(), ["10", "B"]);
        assert_eq!(gw.children("DPT", &[], None, 2).unwrap(), ["1", "2"]);
    }

    #[test]
    fn traversal_cap_is_enforced() {
        let gw = Gateway::new(InMemoryStore::new(), RetryPolicy::no_retry(), 3);
        for i in 1..=5 {
            gw.set("x", "G", &[&i.to_string()]).unwrap();
        }
        assert!(gw.children("G", &[], None, 100).is_err());
        assert_eq!(gw.children("G", &[], None, 2).unwrap().len(), 2);
    }

    #[test]
    fn last_integer_skips_strings_and_fractions() {
        let gw = gateway();
        assert_eq!(gw.last_integer_subscript("DPT").unwrap(), None);

        gw.set("header", "DPT", &["0"]).unwrap();
        assert_eq!(gw.last_integer_subscript("DPT").unwrap(), None);

        gw.set("x", "DPT", &["7", ".01"]).unwrap();
        gw.set("x", "DPT", &["7.5"]).unwrap();
        gw.set("", "DPT", &["B", "X", "7"]).unwrap();
        gw.set("", "DPT", &["SSN", "1", "7"]).unwrap();
        assert_eq!(gw.last_integer_subscript("DPT").unwrap(), Some(7));
    }

    #[test]
    fn ien_shape() {
        for ok in ["1", "42", "1000000"] {
            assert!(is_ien(ok), "{ok}");
        }
        for bad in ["", "0", "01", "-1", "1.5", "B", " 1"] {
            assert!(!is_ien(bad), "{bad:?}");
        }
    }

    #[test]
    fn closed_store_is_connection_error() {
        let gw = gateway();
        gw.store().close().unwrap();
        let err = gw.get("DPT", &["1"]).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Connection);
    }
}
