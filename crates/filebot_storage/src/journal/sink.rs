//! Byte sinks the journal is written to.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An append-only byte log.
///
/// Sinks do not interpret the bytes; framing and replay live in
/// [`super::record`].
pub trait JournalSink: Send + Sync {
    /// Reads the entire log.
    fn read_all(&mut self) -> StoreResult<Vec<u8>>;

    /// Appends bytes to the end of the log.
    fn append(&mut self, data: &[u8]) -> StoreResult<()>;

    /// Makes appended bytes durable.
    fn sync(&mut self) -> StoreResult<()>;

    /// Drops everything after `len`.
    fn truncate(&mut self, len: u64) -> StoreResult<()>;

    /// Replaces the whole log with `data`.
    fn replace(&mut self, data: &[u8]) -> StoreResult<()>;
}

/// A journal file held under an exclusive advisory lock.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Opens or creates the journal file and locks it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JournalLocked`] if another process holds the
    /// file, or an I/O error if it cannot be opened.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::from_io)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(StoreError::from_io)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::JournalLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JournalSink for FileSink {
    fn read_all(&mut self) -> StoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(StoreError::from_io)?;
        self.file
            .read_to_end(&mut buf)
            .map_err(StoreError::from_io)?;
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<()> {
        self.file.seek(SeekFrom::End(0)).map_err(StoreError::from_io)?;
        self.file.write_all(data).map_err(StoreError::from_io)?;
        self.file.flush().map_err(StoreError::from_io)
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.file.sync_data().map_err(StoreError::from_io)
    }

    fn truncate(&mut self, len: u64) -> StoreResult<()> {
        self.file.set_len(len).map_err(StoreError::from_io)?;
        self.file.sync_all().map_err(StoreError::from_io)
    }

    /// Writes `data` to a sibling file, syncs it and renames it over the
    /// journal, so an interrupted rewrite leaves the old log intact.
    fn replace(&mut self, data: &[u8]) -> StoreResult<()> {
        let temp_path = compaction_path(&self.path);
        let mut temp = File::create(&temp_path).map_err(StoreError::from_io)?;
        let written = temp
            .write_all(data)
            .and_then(|()| temp.sync_all())
            .map_err(StoreError::from_io);
        drop(temp);
        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        std::fs::rename(&temp_path, &self.path).map_err(StoreError::from_io)?;
        sync_parent(&self.path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(StoreError::from_io)?;
        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::JournalLocked);
        }
        let old = std::mem::replace(&mut self.file, file);
        let _ = FileExt::unlock(&old);
        Ok(())
    }
}

/// The sibling file a compacted journal is staged in.
pub(crate) fn compaction_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".compact");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> StoreResult<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => File::open(dir)
            .and_then(|d| d.sync_all())
            .map_err(StoreError::from_io),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> StoreResult<()> {
    Ok(())
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// An in-memory sink for tests and recovery scenarios.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    data: Vec<u8>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink with pre-existing log bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns a copy of the log bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl JournalSink for MemorySink {
    fn read_all(&mut self) -> StoreResult<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> StoreResult<()> {
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        self.data.truncate(len);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StoreResult<()> {
        self.data = data.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_sink_appends_and_truncates() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::open(&dir.path().join("globals.journal")).unwrap();
        sink.append(b"hello").unwrap();
        sink.append(b" world").unwrap();
        assert_eq!(sink.read_all().unwrap(), b"hello world");

        sink.truncate(5).unwrap();
        assert_eq!(sink.read_all().unwrap(), b"hello");

        sink.replace(b"fresh").unwrap();
        assert_eq!(sink.read_all().unwrap(), b"fresh");
    }

    #[test]
    fn failed_replace_keeps_the_old_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("globals.journal");
        let mut sink = FileSink::open(&path).unwrap();
        sink.append(b"original").unwrap();

        // A directory in the staging slot makes the rewrite fail.
        std::fs::create_dir(compaction_path(&path)).unwrap();
        assert!(sink.replace(b"fresh").is_err());
        assert_eq!(sink.read_all().unwrap(), b"original");
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn replace_keeps_the_file_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("globals.journal");
        let mut sink = FileSink::open(&path).unwrap();
        sink.append(b"old frames").unwrap();
        sink.replace(b"new").unwrap();

        assert!(!compaction_path(&path).exists());
        assert!(matches!(
            FileSink::open(&path),
            Err(StoreError::JournalLocked)
        ));
        sink.append(b"+tail").unwrap();
        drop(sink);
        assert_eq!(std::fs::read(&path).unwrap(), b"new+tail");
    }

    #[test]
    fn second_open_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("globals.journal");
        let _first = FileSink::open(&path).unwrap();
        assert!(matches!(
            FileSink::open(&path),
            Err(StoreError::JournalLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("globals.journal");
        drop(FileSink::open(&path).unwrap());
        assert!(FileSink::open(&path).is_ok());
    }
}
