//! Hierarchical, incremental node locks for in-process backends.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct HeldLock {
    /// Global name followed by subscripts.
    path: Vec<String>,
    owner: ThreadId,
    depth: u32,
}

/// Lock table keyed by node path.
///
/// A lock on a node covers its whole subtree, so two paths conflict when
/// one is a prefix of the other. Locks are owned by the acquiring thread and
/// are incremental: locking the same path again from the owner bumps a depth
/// counter, and each `release` undoes one level.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    held: Mutex<Vec<HeldLock>>,
    released: Condvar,
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the lock. Returns false on timeout.
    pub fn acquire(&self, path: Vec<String>, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();

        loop {
            if let Some(mine) = held.iter_mut().find(|h| h.owner == me && h.path == path) {
                mine.depth += 1;
                return true;
            }

            let blocked = held
                .iter()
                .any(|h| h.owner != me && overlaps(&h.path, &path));
            if !blocked {
                held.push(HeldLock {
                    path,
                    owner: me,
                    depth: 1,
                });
                return true;
            }

            if Instant::now() >= deadline {
                return false;
            }
            self.released.wait_until(&mut held, deadline);
        }
    }

    /// Releases one level of the calling thread's lock on `path`.
    pub fn release(&self, path: &[String]) -> bool {
        let me = thread::current().id();
        let mut held = self.held.lock();
        let Some(pos) = held.iter().position(|h| h.owner == me && h.path == path) else {
            return false;
        };

        held[pos].depth -= 1;
        if held[pos].depth == 0 {
            held.swap_remove(pos);
            self.released.notify_all();
        }
        true
    }

    /// Drops every lock, waking all waiters. Used when the store closes.
    pub fn clear(&self) {
        self.held.lock().clear();
        self.released.notify_all();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.held.lock().len()
    }
}

/// Builds a lock path from a normalized global name and subscripts.
pub(crate) fn lock_path(global: &str, subscripts: &[&str]) -> Vec<String> {
    std::iter::once(global)
        .chain(subscripts.iter().copied())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reentrant_for_owner() {
        let table = LockTable::new();
        assert!(table.acquire(path(&["DPT", "1"]), Duration::ZERO));
        assert!(table.acquire(path(&["DPT", "1"]), Duration::ZERO));
        assert_eq!(table.len(), 1);

        assert!(table.release(&path(&["DPT", "1"])));
        assert_eq!(table.len(), 1);
        assert!(table.release(&path(&["DPT", "1"])));
        assert_eq!(table.len(), 0);
        assert!(!table.release(&path(&["DPT", "1"])));
    }

    #[test]
    fn other_thread_blocks_on_overlap() {
        let table = Arc::new(LockTable::new());
        assert!(table.acquire(path(&["DPT", "1"]), Duration::ZERO));

        let t = Arc::clone(&table);
        let results = thread::spawn(move || {
            (
                t.acquire(path(&["DPT", "1", ".01"]), Duration::from_millis(20)),
                t.acquire(path(&["DPT"]), Duration::from_millis(20)),
                t.acquire(path(&["DPT", "2"]), Duration::ZERO),
            )
        })
        .join()
        .unwrap();

        assert_eq!(results, (false, false, true));
    }

    #[test]
    fn waiter_wakes_on_release() {
        let table = Arc::new(LockTable::new());
        assert!(table.acquire(path(&["SC", "4"]), Duration::ZERO));

        let t = Arc::clone(&table);
        let waiter = thread::spawn(move || t.acquire(path(&["SC", "4"]), Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        assert!(table.release(&path(&["SC", "4"])));
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn lock_path_prefixes_global() {
        assert_eq!(lock_path("DPT", &["1"]), path(&["DPT", "1"]));
    }
}
