//! Compact command implementation.

use super::open_journal;
use crate::error::CliResult;
use crate::output::Render;
use serde::Serialize;
use std::path::Path;

/// Compaction statistics.
#[derive(Debug, Serialize)]
pub struct CompactStats {
    /// Frames before compaction.
    pub records_before: u64,
    /// Frames after compaction (one per live value).
    pub records_after: u64,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction; unchanged on a dry run.
    pub bytes_after: u64,
    /// Whether the journal was left untouched.
    pub dry_run: bool,
}

impl Render for CompactStats {
    fn render_text(&self) -> String {
        let saved = self.bytes_before.saturating_sub(self.bytes_after);
        let mut out = format!(
            "Compaction{}:\n  Records: {} -> {}\n  Size:    {} -> {} bytes (saved {saved})\n",
            if self.dry_run { " (dry run)" } else { "" },
            self.records_before,
            self.records_after,
            self.bytes_before,
            self.bytes_after,
        );
        if self.records_after >= self.records_before {
            out.push_str("No compaction needed\n");
        }
        out
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CliResult<CompactStats> {
    let store = open_journal(path)?;
    let before = store.stats();
    let bytes_before = file_size(path);

    if dry_run || before.records <= before.live_values {
        return Ok(CompactStats {
            records_before: before.records,
            records_after: before.live_values,
            bytes_before,
            bytes_after: bytes_before,
            dry_run,
        });
    }

    let after = store.compact()?;
    Ok(CompactStats {
        records_before: before.records,
        records_after: after.records,
        bytes_before,
        bytes_after: file_size(path),
        dry_run,
    })
}
