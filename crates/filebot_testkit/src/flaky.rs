//! A fault-injecting store wrapper.
//!
//! [`FlakyStore`] forwards to an inner store but can fail calls with a
//! connection error on demand, and can hide the inner store's locking so
//! the degraded path is exercised.

use filebot_storage::{
    AdapterKind, Capabilities, DataState, GlobalStore, StoreError, StoreResult, Support,
    Transaction, VersionInfo,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct FaultPlan {
    fail_next: u32,
    fail_every: Option<u64>,
    targeted: Option<Target>,
    injected: u64,
}

/// Fails `remaining` calls of one operation under one first subscript.
#[derive(Debug)]
struct Target {
    operation: &'static str,
    first: String,
    remaining: u32,
}

/// Wraps a store and injects connection failures.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    plan: Mutex<FaultPlan>,
    calls: AtomicU64,
    locking: bool,
}

impl<S: GlobalStore> FlakyStore<S> {
    /// Wraps `inner` with no faults planned.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plan: Mutex::new(FaultPlan::default()),
            calls: AtomicU64::new(0),
            locking: true,
        }
    }

    /// Hides the inner store's locking: `lock` and `unlock` report
    /// [`Support::Unsupported`].
    #[must_use]
    pub fn without_locking(mut self) -> Self {
        self.locking = false;
        self
    }

    /// Fails the next `n` data calls.
    pub fn fail_next(&self, n: u32) {
        self.plan.lock().fail_next = n;
    }

    /// Fails every `n`th data call from now on. `0` disables.
    pub fn fail_every(&self, n: u64) {
        self.plan.lock().fail_every = (n > 0).then_some(n);
    }

    /// Fails the next `n` calls of `operation` whose first subscript is
    /// `first`, such as writes to one cross-reference.
    pub fn fail_under(&self, operation: &'static str, first: &str, n: u32) {
        self.plan.lock().targeted = Some(Target {
            operation,
            first: first.to_string(),
            remaining: n,
        });
    }

    /// Number of failures injected so far.
    pub fn injected(&self) -> u64 {
        self.plan.lock().injected
    }

    /// Number of data calls seen.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, operation: &'static str, subscripts: &[&str]) -> StoreResult<()> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let mut plan = self.plan.lock();
        let targeted = match plan.targeted.as_mut() {
            Some(t)
                if t.remaining > 0
                    && t.operation == operation
                    && subscripts.first() == Some(&t.first.as_str()) =>
            {
                t.remaining -= 1;
                true
            }
            _ => false,
        };
        let fail = if targeted {
            true
        } else if plan.fail_next > 0 {
            plan.fail_next -= 1;
            true
        } else {
            plan.fail_every.is_some_and(|n| call % n == 0)
        };
        if fail {
            plan.injected += 1;
            return Err(StoreError::connection(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }
}

impl<S: GlobalStore> GlobalStore for FlakyStore<S> {
    fn adapter_kind(&self) -> AdapterKind {
        self.inner.adapter_kind()
    }

    fn get(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.check("get", subscripts)?;
        self.inner.get(global, subscripts)
    }

    fn set(&self, value: &str, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.check("set", subscripts)?;
        self.inner.set(value, global, subscripts)
    }

    fn kill(&self, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.check("kill", subscripts)?;
        self.inner.kill(global, subscripts)
    }

    fn order(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.check("order", subscripts)?;
        self.inner.order(global, subscripts)
    }

    fn order_reverse(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.check("order_reverse", subscripts)?;
        self.inner.order_reverse(global, subscripts)
    }

    fn data(&self, global: &str, subscripts: &[&str]) -> StoreResult<DataState> {
        self.check("data", subscripts)?;
        self.inner.data(global, subscripts)
    }

    fn capabilities(&self) -> Capabilities {
        let caps = self.inner.capabilities();
        caps.locking(caps.locking && self.locking)
    }

    fn version_info(&self) -> VersionInfo {
        self.inner.version_info()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn lock(
        &self,
        global: &str,
        subscripts: &[&str],
        timeout: Duration,
    ) -> StoreResult<Support<bool>> {
        if !self.locking {
            return Ok(Support::Unsupported);
        }
        self.check("lock", subscripts)?;
        self.inner.lock(global, subscripts, timeout)
    }

    fn unlock(&self, global: &str, subscripts: &[&str]) -> StoreResult<Support<bool>> {
        if !self.locking {
            return Ok(Support::Unsupported);
        }
        self.inner.unlock(global, subscripts)
    }

    fn begin_transaction(&self) -> StoreResult<Support<Transaction>> {
        self.inner.begin_transaction()
    }

    fn commit_transaction(&self, txn: &mut Transaction) -> StoreResult<Support<()>> {
        self.inner.commit_transaction(txn)
    }

    fn rollback_transaction(&self, txn: &mut Transaction) -> StoreResult<Support<()>> {
        self.inner.rollback_transaction(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::fast_config;
    use filebot_core::{FileBot, FileBotError, LockStatus};
    use filebot_storage::InMemoryStore;

    fn flaky_bot(store: FlakyStore<InMemoryStore>) -> FileBot<FlakyStore<InMemoryStore>> {
        FileBot::with_config(store, fast_config()).unwrap()
    }

    #[test]
    fn transient_failures_are_retried() {
        let bot = flaky_bot(FlakyStore::new(InMemoryStore::new()));
        bot.store().fail_next(2);
        let ien = bot
            .create("PATIENT", &[(".01", "SMITH,JOHN"), (".03", "2850101")])
            .unwrap();
        assert_eq!(ien, "1");
        assert_eq!(bot.store().injected(), 2);
    }

    #[test]
    fn exhausted_retries_surface_attempts() {
        let bot = flaky_bot(FlakyStore::new(InMemoryStore::new()));
        bot.store().fail_next(3);
        let err = bot.get_field("PATIENT", "1", ".01").unwrap_err();
        match &err {
            FileBotError::RetryExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "get");
                assert_eq!(*attempts, 3);
                assert!(matches!(**source, FileBotError::Connection { closed: false, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bot.stats().errors, 1);
    }

    #[test]
    fn failure_mid_create_is_repairable() {
        let bot = flaky_bot(FlakyStore::new(InMemoryStore::new()));
        bot.store().fail_under("set", "B", 3);
        assert!(matches!(
            bot.create("PATIENT", &[(".01", "SMITH,JOHN"), (".03", "2850101")]),
            Err(FileBotError::RetryExhausted { .. })
        ));
        assert_eq!(bot.store().injected(), 3);

        let report = bot.verify_xrefs("PATIENT").unwrap();
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].value, "SMITH,JOHN");

        bot.repair_xrefs("PATIENT").unwrap();
        assert!(bot.verify_xrefs("PATIENT").unwrap().is_consistent());
        assert_eq!(
            bot.find_entries("PATIENT", ".01", "SMITH,JOHN", 5).unwrap().ids,
            ["1"]
        );
    }

    #[test]
    fn degraded_locking_still_writes() {
        let bot = flaky_bot(FlakyStore::new(InMemoryStore::new()).without_locking());
        assert!(!bot.capabilities().locking);

        let ien = bot
            .create("PATIENT", &[(".01", "SMITH,JOHN"), (".03", "2850101")])
            .unwrap();
        let guard = bot.lock_record("PATIENT", &ien).unwrap();
        assert_eq!(guard.status(), LockStatus::Unsupported);
        bot.update("PATIENT", &ien, &[(".02", "F")]).unwrap();
        drop(guard);
        assert_eq!(bot.unlock_record("PATIENT", &ien).unwrap(), LockStatus::Unsupported);
    }
}
