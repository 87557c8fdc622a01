//! Journal-backed global store.
//!
//! Every mutation is appended to a framed log before it is applied to the
//! in-memory tree, and the tree is rebuilt by replaying the log on open.
//! A torn final frame (an append interrupted by a crash) is truncated away.

mod record;
mod sink;

pub use record::{compute_crc32, decode_frames, JournalRecord, Replay, FRAME_HEADER_SIZE};
pub use sink::{FileSink, JournalSink, MemorySink};

use crate::adapter::AdapterKind;
use crate::error::{StoreError, StoreResult};
use crate::locks::{lock_path, LockTable};
use crate::store::{Capabilities, DataState, GlobalStore, Support, VersionInfo};
use crate::subscript::{check_subscripts, normalize_global_name, split_order_path};
use crate::tree::GlobalTree;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Journal statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JournalStats {
    /// Frames appended or replayed since open.
    pub records: u64,
    /// Nodes currently holding a value.
    pub live_values: u64,
}

/// A persistent global store built on an append-only journal.
///
/// Supports locking within the process. It has no transactions: each
/// `set` and `kill` is durable on its own.
pub struct JournalStore {
    sink: Mutex<Box<dyn JournalSink>>,
    tree: RwLock<GlobalTree>,
    locks: LockTable,
    open: AtomicBool,
    path: Option<PathBuf>,
    sync_on_write: bool,
    records: Mutex<u64>,
    valid_len: Mutex<u64>,
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("path", &self.path)
            .field("open", &self.open.load(Ordering::Relaxed))
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

impl JournalStore {
    /// Opens (or creates) a journal file and replays it.
    ///
    /// # Errors
    ///
    /// Fails if the file is locked by another process, cannot be read, or
    /// holds a corrupted frame before its end.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let sink = FileSink::open(path)?;
        let mut store = Self::with_sink(Box::new(sink))?;
        store.path = Some(path.to_path_buf());
        info!(path = %path.display(), "journal opened");
        Ok(store)
    }

    /// Builds a store over an arbitrary sink, replaying its contents.
    pub fn with_sink(mut sink: Box<dyn JournalSink>) -> StoreResult<Self> {
        let bytes = sink.read_all()?;
        let replay = decode_frames(&bytes)?;
        let total = bytes.len() as u64;
        if replay.has_torn_tail(total) {
            warn!(
                valid = replay.valid_len,
                total, "truncating torn journal tail"
            );
            sink.truncate(replay.valid_len)?;
        }

        let mut tree = GlobalTree::new();
        for record in &replay.records {
            apply(&mut tree, record);
        }
        debug!(records = replay.records.len(), "journal replayed");

        Ok(Self {
            sink: Mutex::new(sink),
            tree: RwLock::new(tree),
            locks: LockTable::new(),
            open: AtomicBool::new(true),
            path: None,
            sync_on_write: true,
            records: Mutex::new(replay.records.len() as u64),
            valid_len: Mutex::new(replay.valid_len),
        })
    }

    /// Sets whether every append is synced to disk before returning.
    #[must_use]
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }

    /// Returns the journal file path, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns record and value counts.
    #[must_use]
    pub fn stats(&self) -> JournalStats {
        let tree = self.tree.read();
        let live_values = tree
            .global_names()
            .iter()
            .map(|g| tree.value_count(g) as u64)
            .sum();
        JournalStats {
            records: *self.records.lock(),
            live_values,
        }
    }

    /// Returns the names of all globals that currently hold data.
    #[must_use]
    pub fn global_names(&self) -> Vec<String> {
        self.tree.read().global_names()
    }

    /// Returns every (subscripts, value) pair under a global.
    pub fn entries(&self, global: &str) -> StoreResult<Vec<(Vec<String>, String)>> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        Ok(self.tree.read().entries(global))
    }

    /// Rewrites the journal so it holds one `Set` per live value.
    pub fn compact(&self) -> StoreResult<JournalStats> {
        self.ensure_open()?;
        let tree = self.tree.write();
        let mut bytes = Vec::new();
        let mut count = 0u64;
        for global in tree.global_names() {
            for (subscripts, value) in tree.entries(&global) {
                let record = JournalRecord::Set {
                    global: global.clone(),
                    subscripts,
                    value,
                };
                bytes.extend(record.encode_frame()?);
                count += 1;
            }
        }
        self.sink.lock().replace(&bytes)?;
        *self.valid_len.lock() = bytes.len() as u64;
        *self.records.lock() = count;
        info!(records = count, bytes = bytes.len(), "journal compacted");
        Ok(JournalStats {
            records: count,
            live_values: count,
        })
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }

    fn append(&self, record: &JournalRecord) -> StoreResult<()> {
        let frame = record.encode_frame()?;
        let mut sink = self.sink.lock();
        let mut valid_len = self.valid_len.lock();
        if let Err(e) = sink.append(&frame) {
            // A partial frame must not be followed by later appends.
            if let Err(cleanup) = sink.truncate(*valid_len) {
                warn!(error = %cleanup, "failed to drop partial journal frame");
            }
            return Err(e);
        }
        *valid_len += frame.len() as u64;
        if self.sync_on_write {
            sink.sync()?;
        }
        *self.records.lock() += 1;
        Ok(())
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
        Ok(self.tree.read().order(global, parent, current, reverse))
    }
}

fn apply(tree: &mut GlobalTree, record: &JournalRecord) {
    match record {
        JournalRecord::Set {
            global,
            subscripts,
            value,
        } => {
            let subs: Vec<&str> = subscripts.iter().map(String::as_str).collect();
            tree.set(global, &subs, value);
        }
        JournalRecord::Kill { global, subscripts } => {
            let subs: Vec<&str> = subscripts.iter().map(String::as_str).collect();
            tree.kill(global, &subs);
        }
    }
}

fn owned(subscripts: &[&str]) -> Vec<String> {
    subscripts.iter().map(|s| s.to_string()).collect()
}

impl GlobalStore for JournalStore {
    fn adapter_kind(&self) -> AdapterKind {
        AdapterKind::Journal
    }

    fn get(&self, global: &str, subscripts: &[&str]) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;
        Ok(self
            .tree
            .read()
            .get(global, subscripts)
            .map(str::to_string))
    }

    fn set(&self, value: &str, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;

        let record = JournalRecord::Set {
            global: global.to_string(),
            subscripts: owned(subscripts),
            value: value.to_string(),
        };
        let mut tree = self.tree.write();
        self.append(&record)?;
        tree.set(global, subscripts, value);
        Ok(())
    }

    fn kill(&self, global: &str, subscripts: &[&str]) -> StoreResult<()> {
        self.ensure_open()?;
        let global = normalize_global_name(global)?;
        check_subscripts(subscripts)?;

        let mut tree = self.tree.write();
        if !tree.data(global, subscripts).exists() {
            return Ok(());
        }
        self.append(&JournalRecord::Kill {
            global: global.to_string(),
            subscripts: owned(subscripts),
        })?;
        tree.kill(global, subscripts);
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
        Ok(self.tree.read().data(global, subscripts))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
            .locking(true)
            .unicode(true)
            .concurrent_access(false)
    }

    fn version_info(&self) -> VersionInfo {
        VersionInfo {
            adapter_version: crate::VERSION.to_string(),
            backend_version: "journal-v1".to_string(),
        }
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> StoreResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.locks.clear();
        self.sink.lock().sync()?;
        info!("journal closed");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("globals.journal");
        {
            let store = JournalStore::open(&path).unwrap();
            store.set("SMITH,JOHN", "^DPT", &["1", ".01"]).unwrap();
            store.set("", "DPT", &["B", "SMITH,JOHN", "1"]).unwrap();
            store.set("tmp", "DPT", &["2", ".01"]).unwrap();
            store.kill("DPT", &["2"]).unwrap();
            store.close().unwrap();
        }

        let store = JournalStore::open(&path).unwrap();
        assert_eq!(
            store.get("DPT", &["1", ".01"]).unwrap().as_deref(),
            Some("SMITH,JOHN")
        );
        assert_eq!(store.data("DPT", &["2"]).unwrap(), DataState::Undefined);
        assert_eq!(
            store.order("DPT", &["B", "SMITH,JOHN", ""]).unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn torn_tail_truncated_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("globals.journal");
        {
            let store = JournalStore::open(&path).unwrap();
            store.set("A", "X", &["1"]).unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[9, 0, 0, 0, 1, 2]).unwrap();
        }

        let store = JournalStore::open(&path).unwrap();
        assert_eq!(store.get("X", &["1"]).unwrap().as_deref(), Some("A"));
        drop(store);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn corrupted_frame_refuses_open() {
        let mut bytes = Vec::new();
        for v in ["A", "B"] {
            bytes.extend(
                JournalRecord::Set {
                    global: "X".into(),
                    subscripts: vec!["1".into()],
                    value: v.into(),
                }
                .encode_frame()
                .unwrap(),
            );
        }
        bytes[FRAME_HEADER_SIZE + 1] ^= 0x55;

        let result = JournalStore::with_sink(Box::new(MemorySink::with_data(bytes)));
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn compact_keeps_only_live_values() {
        let store = JournalStore::with_sink(Box::new(MemorySink::new())).unwrap();
        for i in 0..5 {
            store.set(&i.to_string(), "X", &["1"]).unwrap();
        }
        store.set("keep", "X", &["2"]).unwrap();
        store.kill("X", &["2"]).unwrap();
        assert_eq!(store.stats().records, 7);

        let stats = store.compact().unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(store.get("X", &["1"]).unwrap().as_deref(), Some("4"));
    }

    /// Writes half of every frame once `fail_next` is set, then errors.
    struct ShortWriteSink {
        bytes: Arc<Mutex<Vec<u8>>>,
        fail_next: Arc<AtomicBool>,
    }

    impl JournalSink for ShortWriteSink {
        fn read_all(&mut self) -> StoreResult<Vec<u8>> {
            Ok(self.bytes.lock().clone())
        }

        fn append(&mut self, data: &[u8]) -> StoreResult<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                self.bytes.lock().extend_from_slice(&data[..data.len() / 2]);
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "disk full",
                )));
            }
            self.bytes.lock().extend_from_slice(data);
            Ok(())
        }

        fn sync(&mut self) -> StoreResult<()> {
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> StoreResult<()> {
            self.bytes.lock().truncate(len as usize);
            Ok(())
        }

        fn replace(&mut self, data: &[u8]) -> StoreResult<()> {
            *self.bytes.lock() = data.to_vec();
            Ok(())
        }
    }

    #[test]
    fn failed_append_leaves_no_partial_frame() {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let fail_next = Arc::new(AtomicBool::new(false));
        let store = JournalStore::with_sink(Box::new(ShortWriteSink {
            bytes: Arc::clone(&bytes),
            fail_next: Arc::clone(&fail_next),
        }))
        .unwrap();

        store.set("A", "X", &["1"]).unwrap();
        fail_next.store(true, Ordering::SeqCst);
        assert!(store.set("B", "X", &["2"]).is_err());
        assert_eq!(store.get("X", &["2"]).unwrap(), None);
        store.set("C", "X", &["3"]).unwrap();

        let log = bytes.lock().clone();
        let replay = decode_frames(&log).unwrap();
        assert_eq!(replay.records.len(), 2);
        assert!(!replay.has_torn_tail(log.len() as u64));

        let reopened = JournalStore::with_sink(Box::new(MemorySink::with_data(log))).unwrap();
        assert_eq!(reopened.get("X", &["1"]).unwrap().as_deref(), Some("A"));
        assert_eq!(reopened.get("X", &["3"]).unwrap().as_deref(), Some("C"));
        assert_eq!(reopened.stats().records, 2);
    }

    #[test]
    fn interrupted_compaction_keeps_every_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("globals.journal");
        {
            let store = JournalStore::open(&path).unwrap();
            for i in 1..=10 {
                let ien = i.to_string();
                store.set("old", "DPT", &[ien.as_str(), ".01"]).unwrap();
                store
                    .set(&format!("PATIENT,{i}"), "DPT", &[ien.as_str(), ".01"])
                    .unwrap();
            }
            std::fs::create_dir(sink::compaction_path(&path)).unwrap();
            assert!(store.compact().is_err());
            store.set("LATE,ENTRY", "DPT", &["11", ".01"]).unwrap();
        }

        let store = JournalStore::open(&path).unwrap();
        for i in 1..=10 {
            let ien = i.to_string();
            assert_eq!(
                store.get("DPT", &[ien.as_str(), ".01"]).unwrap(),
                Some(format!("PATIENT,{i}"))
            );
        }
        assert_eq!(
            store.get("DPT", &["11", ".01"]).unwrap().as_deref(),
            Some("LATE,ENTRY")
        );
    }

    #[test]
    fn kill_of_absent_node_is_not_logged() {
        let store = JournalStore::with_sink(Box::new(MemorySink::new())).unwrap();
        store.kill("X", &["1"]).unwrap();
        assert_eq!(store.stats().records, 0);
    }

    #[test]
    fn transactions_unsupported() {
        let store = JournalStore::with_sink(Box::new(MemorySink::new())).unwrap();
        assert!(!store.capabilities().transactions);
        assert!(matches!(
            store.begin_transaction().unwrap(),
            Support::Unsupported
        ));
    }

    #[test]
    fn closed_journal_rejects_writes() {
        let store = JournalStore::with_sink(Box::new(MemorySink::new())).unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.set("A", "X", &["1"]),
            Err(StoreError::Disconnected)
        ));
    }
}
