//! Inspect command implementation.

use super::open_journal;
use crate::error::CliResult;
use crate::output::Render;
use filebot_core::HEADER_SUBSCRIPT;
use filebot_storage::GlobalStore;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal file size in bytes.
    pub file_size: u64,
    /// Frames in the journal.
    pub records: u64,
    /// Nodes currently holding a value.
    pub live_values: u64,
    /// Per-global summaries in name order.
    pub globals: Vec<GlobalSummary>,
}

/// Statistics for a single global.
#[derive(Debug, Serialize)]
pub struct GlobalSummary {
    /// Bare global name.
    pub name: String,
    /// Nodes holding a value.
    pub nodes: usize,
    /// Distinct first-level subscripts.
    pub top_level: usize,
    /// The `^G(0)` file header, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

/// Runs the inspect command.
pub fn run(path: &Path) -> CliResult<InspectResult> {
    let store = open_journal(path)?;
    let stats = store.stats();

    let mut globals = Vec::new();
    for name in store.global_names() {
        let entries = store.entries(&name)?;
        let mut top_level: Vec<&str> = entries
            .iter()
            .filter_map(|(subs, _)| subs.first().map(String::as_str))
            .collect();
        top_level.dedup();
        let header = store.get(&name, &[HEADER_SUBSCRIPT])?;
        globals.push(GlobalSummary {
            nodes: entries.len(),
            top_level: top_level.len(),
            header,
            name,
        });
    }

    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    Ok(InspectResult {
        path: path.display().to_string(),
        file_size,
        records: stats.records,
        live_values: stats.live_values,
        globals,
    })
}

impl Render for InspectResult {
    fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "FileBot Journal Inspection");
        let _ = writeln!(out, "==========================");
        let _ = writeln!(out);
        let _ = writeln!(out, "Path: {}", self.path);
        let _ = writeln!(out, "Size: {}", format_size(self.file_size));
        let _ = writeln!(out);
        let _ = writeln!(out, "Journal:");
        let _ = writeln!(out, "  Records:     {}", self.records);
        let _ = writeln!(out, "  Live values: {}", self.live_values);
        let _ = writeln!(out);
        let _ = writeln!(out, "Globals:");
        if self.globals.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for g in &self.globals {
            let _ = write!(out, "  ^{} {} nodes, {} top-level", g.name, g.nodes, g.top_level);
            if let Some(header) = &g.header {
                let _ = write!(out, " [{header}]");
            }
            let _ = writeln!(out);
        }
        out
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::patient_journal;

    #[test]
    fn summarizes_globals() {
        let (_dir, path) = patient_journal();
        let result = run(&path).unwrap();

        assert_eq!(result.globals.len(), 1);
        let dpt = &result.globals[0];
        assert_eq!(dpt.name, "DPT");
        assert_eq!(dpt.header.as_deref(), Some("PATIENT^2^3^3"));
        // Header, 3 records of 3 fields, 3 B entries, 3 SSN entries.
        assert_eq!(dpt.nodes, 1 + 9 + 3 + 3);
        // 0, 1, 2, 3, B, SSN
        assert_eq!(dpt.top_level, 6);
        assert_eq!(result.live_values, 16);
        assert!(result.file_size > 0);
    }

    #[test]
    fn text_lists_each_global() {
        let (_dir, path) = patient_journal();
        let text = run(&path).unwrap().render_text();
        assert!(text.contains("^DPT 16 nodes"));
        assert!(text.contains("[PATIENT^2^3^3]"));
    }

    #[test]
    fn json_output_serializes() {
        let (_dir, path) = patient_journal();
        let json = serde_json::to_value(run(&path).unwrap()).unwrap();
        assert_eq!(json["globals"][0]["name"], "DPT");
    }
}
