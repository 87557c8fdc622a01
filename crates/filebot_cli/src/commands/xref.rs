//! Verify and rebuild command implementations.

use super::open_journal;
use crate::error::CliResult;
use crate::output::Render;
use filebot_core::{FileBot, XrefEntry, XrefReport};
use filebot_storage::GlobalStore;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;
use tracing::info;

/// The outcome of verifying or repairing one entity.
#[derive(Debug, Serialize)]
pub struct XrefOutcome {
    /// Entity name.
    pub entity: String,
    /// Whether the index was repaired.
    pub repaired: bool,
    /// Differences found before any repair.
    pub report: XrefReport,
}

impl Render for XrefOutcome {
    fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Cross-references for {}", self.entity);
        let entries = |out: &mut String, label: &str, list: &[XrefEntry]| {
            for e in list {
                let _ = writeln!(out, "  {label} {} {:?} -> {}", e.xref, e.value, e.ien);
            }
        };
        entries(&mut out, "missing", &self.report.missing);
        entries(&mut out, "stale  ", &self.report.stale);
        let _ = writeln!(out);
        if self.report.is_consistent() {
            let _ = writeln!(out, "✓ Index consistent");
        } else if self.repaired {
            let _ = writeln!(
                out,
                "✓ Repaired {} missing and {} stale entries",
                self.report.missing.len(),
                self.report.stale.len()
            );
        } else {
            let _ = writeln!(
                out,
                "✗ {} missing, {} stale",
                self.report.missing.len(),
                self.report.stale.len()
            );
        }
        out
    }
}

fn entity_name<S: GlobalStore>(bot: &FileBot<S>, entity: &str) -> String {
    bot.dictionary()
        .entity(entity)
        .map_or_else(|| entity.to_string(), |e| e.name.clone())
}

/// Runs the verify command.
pub fn verify(path: &Path, entity: &str) -> CliResult<XrefOutcome> {
    let bot = FileBot::new(open_journal(path)?)?;
    let report = bot.verify_xrefs(entity)?;
    Ok(XrefOutcome {
        entity: entity_name(&bot, entity),
        repaired: false,
        report,
    })
}

/// Runs the rebuild command.
pub fn rebuild(path: &Path, entity: &str) -> CliResult<XrefOutcome> {
    let bot = FileBot::new(open_journal(path)?)?;
    let report = bot.repair_xrefs(entity)?;
    info!(
        entity,
        missing = report.missing.len(),
        stale = report.stale.len(),
        "cross-references rebuilt"
    );
    Ok(XrefOutcome {
        entity: entity_name(&bot, entity),
        repaired: true,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::patient_journal;
    use filebot_core::FileBotError;
    use filebot_storage::JournalStore;

    fn damage(path: &Path) {
        let store = JournalStore::open(path).unwrap();
        store.kill("DPT", &["SSN", "234567890"]).unwrap();
        store.set("", "DPT", &["B", "GHOST,CASPER", "9"]).unwrap();
    }

    #[test]
    fn clean_journal_verifies() {
        let (_dir, path) = patient_journal();
        let outcome = verify(&path, "2").unwrap();
        assert_eq!(outcome.entity, "PATIENT");
        assert!(outcome.report.is_consistent());
        assert!(outcome.render_text().contains("Index consistent"));
    }

    #[test]
    fn rebuild_repairs_damage() {
        let (_dir, path) = patient_journal();
        damage(&path);

        let before = verify(&path, "PATIENT").unwrap();
        assert_eq!(before.report.missing.len(), 1);
        assert_eq!(before.report.missing[0].value, "234567890");
        assert_eq!(before.report.stale.len(), 1);
        assert_eq!(before.report.stale[0].ien, "9");

        let repaired = rebuild(&path, "DPT").unwrap();
        assert!(repaired.repaired);
        assert!(repaired.render_text().contains("Repaired 1 missing and 1 stale"));
        assert!(verify(&path, "PATIENT").unwrap().report.is_consistent());
    }

    #[test]
    fn unknown_entity_is_reported() {
        let (_dir, path) = patient_journal();
        assert!(matches!(
            verify(&path, "NOT A GLOBAL"),
            Err(crate::error::CliError::FileBot(FileBotError::UnknownEntity(_)))
        ));
    }
}
