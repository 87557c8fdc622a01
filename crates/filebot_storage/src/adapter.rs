//! Backend selection and connection health caching.

use crate::error::StoreResult;
use crate::journal::JournalStore;
use crate::memory::InMemoryStore;
use crate::store::{
    Capabilities, ConnectionResult, DataState, GlobalStore, Support, Transaction, VersionInfo,
};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The kind of backend behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Volatile in-process tree.
    Memory,
    /// Append-only journal file.
    Journal,
}

impl AdapterKind {
    /// Returns the lowercase name used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Journal => "journal",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterSpec {
    /// An in-memory store.
    Memory,
    /// A journal file at the given path.
    Journal {
        /// Journal file location.
        path: PathBuf,
    },
}

/// Adapter-level settings.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Which backend to use.
    pub spec: AdapterSpec,
    /// How long a successful health check is trusted.
    pub health_ttl: Duration,
    /// Whether the journal syncs every append.
    pub sync_on_write: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            spec: AdapterSpec::Memory,
            health_ttl: Duration::from_secs(5),
            sync_on_write: true,
        }
    }
}

impl AdapterConfig {
    /// Config for an in-memory adapter.
    #[must_use]
    pub fn memory() -> Self {
        Self::default()
    }

    /// Config for a journal adapter at `path`.
    #[must_use]
    pub fn journal(path: impl Into<PathBuf>) -> Self {
        Self {
            spec: AdapterSpec::Journal { path: path.into() },
            ..Self::default()
        }
    }

    /// Sets the health cache TTL.
    #[must_use]
    pub fn health_ttl(mut self, ttl: Duration) -> Self {
        self.health_ttl = ttl;
        self
    }

    /// Sets journal sync-on-write.
    #[must_use]
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }
}

/// Cached result of the last connection probe.
#[derive(Debug)]
struct ConnectionHealth {
    ttl: Duration,
    last_checked: Option<Instant>,
    last_status: bool,
}

impl ConnectionHealth {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_checked: None,
            last_status: false,
        }
    }

    fn fresh(&self) -> Option<bool> {
        let checked = self.last_checked?;
        (checked.elapsed() < self.ttl).then_some(self.last_status)
    }

    fn record(&mut self, status: bool) {
        self.last_checked = Some(Instant::now());
        self.last_status = status;
    }

    fn invalidate(&mut self) {
        self.last_checked = None;
    }
}

#[derive(Debug)]
enum Backend {
    Memory(InMemoryStore),
    Journal(JournalStore),
}

impl Backend {
    fn store(&self) -> &dyn GlobalStore {
        match self {
            Self::Memory(store) => store,
            Self::Journal(store) => store,
        }
    }
}

/// A configured backend with a cached health probe.
///
/// `is_connected` runs a real round trip at most once per TTL; in between
/// it answers from the cache. A failed operation is not cached, so the next
/// check after a failure always probes again.
#[derive(Debug)]
pub struct Adapter {
    backend: Backend,
    health: Mutex<ConnectionHealth>,
}

impl Adapter {
    /// Builds the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if a journal cannot be opened.
    pub fn open(config: &AdapterConfig) -> StoreResult<Self> {
        let backend = match &config.spec {
            AdapterSpec::Memory => Backend::Memory(InMemoryStore::new()),
            AdapterSpec::Journal { path } => Backend::Journal(
                JournalStore::open(path)?.sync_on_write(config.sync_on_write),
            ),
        };
        info!(kind = %backend.store().adapter_kind(), "adapter opened");
        Ok(Self {
            backend,
            health: Mutex::new(ConnectionHealth::new(config.health_ttl)),
        })
    }

    /// Wraps an existing in-memory store.
    #[must_use]
    pub fn from_memory(store: InMemoryStore) -> Self {
        Self {
            backend: Backend::Memory(store),
            health: Mutex::new(ConnectionHealth::new(AdapterConfig::default().health_ttl)),
        }
    }

    /// Returns the journal store, if that is the backend.
    #[must_use]
    pub fn as_journal(&self) -> Option<&JournalStore> {
        match &self.backend {
            Backend::Journal(store) => Some(store),
            Backend::Memory(_) => None,
        }
    }

    /// Drops any cached health result.
    pub fn invalidate_health(&self) {
        self.health.lock().invalidate();
    }
}

impl GlobalStore for Adapter {
    fn adapter_kind(&self) -> AdapterKind {
        self.backend.store().adapter_kind()
    }

    fn get(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.backend.store().get(global, subscripts)
    }

    fn set(&self, value: &str, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.backend.store().set(value, global, subscripts)
    }

    fn kill(&self, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.backend.store().kill(global, subscripts)
    }

    fn order(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.backend.store().order(global, subscripts)
    }

    fn order_reverse(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.backend.store().order_reverse(global, subscripts)
    }

    fn data(&self, global: &str, subscripts: &[&str]) -> StoreResult<DataState> {
        self.backend.store().data(global, subscripts)
    }

    fn capabilities(&self) -> Capabilities {
        self.backend.store().capabilities()
    }

    fn version_info(&self) -> VersionInfo {
        self.backend.store().version_info()
    }

    fn is_connected(&self) -> bool {
        if let Some(status) = self.health.lock().fresh() {
            return status;
        }
        let result = self.test_connection();
        result.success
    }

    fn close(&self) -> StoreResult<()> {
        self.health.lock().invalidate();
        self.backend.store().close()
    }

    fn lock(
        &self,
        global: &str,
        subscripts: &[&str],
        timeout: Duration,
    ) -> StoreResult<Support<bool>> {
        self.backend.store().lock(global, subscripts, timeout)
    }

    fn unlock(&self, global: &str, subscripts: &[&str]) -> StoreResult<Support<bool>> {
        self.backend.store().unlock(global, subscripts)
    }

    fn begin_transaction(&self) -> StoreResult<Support<Transaction>> {
        self.backend.store().begin_transaction()
    }

    fn commit_transaction(&self, txn: &mut Transaction) -> StoreResult<Support<()>> {
        self.backend.store().commit_transaction(txn)
    }

    fn rollback_transaction(&self, txn: &mut Transaction) -> StoreResult<Support<()>> {
        self.backend.store().rollback_transaction(txn)
    }

    fn execute(&self, code: &str) -> StoreResult<Support<String>> {
        self.backend.store().execute(code)
    }

    fn test_connection(&self) -> ConnectionResult {
        let result = self.backend.store().test_connection();
        if result.success {
            debug!(latency = ?result.latency, "connection probe succeeded");
            self.health.lock().record(true);
        } else {
            warn!(message = %result.message, "connection probe failed");
            self.health.lock().invalidate();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_adapter_delegates() {
        let adapter = Adapter::open(&AdapterConfig::memory()).unwrap();
        assert_eq!(adapter.adapter_kind(), AdapterKind::Memory);
        adapter.set("1", "DPT", &["0"]).unwrap();
        assert_eq!(adapter.get("^DPT", &["0"]).unwrap().as_deref(), Some("1"));
        assert!(adapter.capabilities().transactions);
        assert!(adapter.as_journal().is_none());
    }

    #[test]
    fn journal_adapter_opens_file() {
        let dir = tempdir().unwrap();
        let config = AdapterConfig::journal(dir.path().join("db.journal")).sync_on_write(false);
        let adapter = Adapter::open(&config).unwrap();
        assert_eq!(adapter.adapter_kind().as_str(), "journal");
        assert!(!adapter.capabilities().transactions);
        assert!(adapter.as_journal().is_some());
    }

    #[test]
    fn health_is_cached_until_invalidated() {
        let adapter = Adapter::open(&AdapterConfig::memory().health_ttl(Duration::from_secs(60)))
            .unwrap();
        assert!(adapter.is_connected());
        assert_eq!(adapter.health.lock().fresh(), Some(true));

        adapter.invalidate_health();
        assert_eq!(adapter.health.lock().fresh(), None);
    }

    #[test]
    fn closed_adapter_reports_disconnected() {
        let adapter = Adapter::from_memory(InMemoryStore::new());
        assert!(adapter.is_connected());
        adapter.close().unwrap();
        assert!(!adapter.is_connected());
    }

    #[test]
    fn zero_ttl_always_probes() {
        let adapter = Adapter::open(&AdapterConfig::memory().health_ttl(Duration::ZERO)).unwrap();
        assert!(adapter.is_connected());
        assert_eq!(adapter.health.lock().fresh(), None);
    }
}
