//! Test fixtures and orchestrator helpers.
//!
//! Provides orchestrators over temporary stores and a few seeded
//! patient files.

use filebot_core::{FileBot, FileBotConfig, RetryPolicy};
use filebot_storage::{GlobalStore, InMemoryStore, JournalStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// A configuration with millisecond retry delays and a short lock timeout.
#[must_use]
pub fn fast_config() -> FileBotConfig {
    FileBotConfig::new()
        .retry(
            RetryPolicy::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(4)),
        )
        .lock_timeout(Duration::from_millis(50))
}

/// An orchestrator with automatic cleanup of its backing files.
pub struct TestFileBot<S> {
    /// The orchestrator.
    pub bot: FileBot<S>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestFileBot<InMemoryStore> {
    /// Creates an orchestrator over a fresh in-memory store.
    pub fn memory() -> Self {
        let bot = FileBot::with_config(InMemoryStore::new(), fast_config())
            .expect("Failed to build the standard dictionary");
        Self {
            bot,
            _temp_dir: None,
        }
    }
}

impl TestFileBot<JournalStore> {
    /// Creates an orchestrator over a journal in a temporary directory.
    pub fn journal() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = JournalStore::open(temp_dir.path().join(JOURNAL_FILE))
            .expect("Failed to open journal");
        let bot = FileBot::with_config(store, fast_config())
            .expect("Failed to build the standard dictionary");
        Self {
            bot,
            _temp_dir: Some(temp_dir),
        }
    }
}

impl<S> TestFileBot<S> {
    /// Returns the journal path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join(JOURNAL_FILE))
    }
}

const JOURNAL_FILE: &str = "globals.journal";

impl<S> std::ops::Deref for TestFileBot<S> {
    type Target = FileBot<S>;

    fn deref(&self) -> &Self::Target {
        &self.bot
    }
}

/// Runs a test with an orchestrator over a fresh in-memory store.
pub fn with_memory_bot<F, R>(f: F) -> R
where
    F: FnOnce(&FileBot<InMemoryStore>) -> R,
{
    let test_bot = TestFileBot::memory();
    f(&test_bot.bot)
}

/// Runs a test with an orchestrator over a temporary journal.
pub fn with_journal_bot<F, R>(f: F) -> R
where
    F: FnOnce(&FileBot<JournalStore>, &std::path::Path) -> R,
{
    let test_bot = TestFileBot::journal();
    let path = test_bot.path().expect("Journal fixture should have a path");
    f(&test_bot.bot, &path)
}

/// One patient to seed a file with, in external form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSeed {
    /// Name as entered.
    pub name: String,
    /// Date of birth as entered.
    pub dob: String,
    /// SSN as entered; empty for none.
    #[serde(default)]
    pub ssn: String,
    /// Sex code as entered; empty for none.
    #[serde(default)]
    pub sex: String,
}

impl PatientSeed {
    /// Field pairs for [`FileBot::create`].
    pub fn fields(&self) -> Vec<(&str, &str)> {
        let mut fields = vec![(".01", self.name.as_str()), (".03", self.dob.as_str())];
        if !self.ssn.is_empty() {
            fields.push((".09", self.ssn.as_str()));
        }
        if !self.sex.is_empty() {
            fields.push((".02", self.sex.as_str()));
        }
        fields
    }
}

const SAMPLE_PATIENTS: &str = r#"[
    {"name": "SMITH,JOHN", "dob": "2850101", "ssn": "123-45-6789", "sex": "M"},
    {"name": "Jane Smith", "dob": "06/15/1990", "ssn": "234567890", "sex": "F"},
    {"name": "Jones, Amy Lee", "dob": "1972-03-09", "ssn": "345-67-8901"},
    {"name": "DOE,RICHARD", "dob": "Jan 5, 1948"},
    {"name": "Smithers, Waylon", "dob": "11/30/71", "ssn": "456789012", "sex": "m"}
]"#;

/// A small, varied set of patients covering every date input form.
pub fn sample_patients() -> Vec<PatientSeed> {
    serde_json::from_str(SAMPLE_PATIENTS).expect("Sample patients are valid JSON")
}

/// Creates every seed and returns the assigned ids in order.
pub fn seed_patients<S: GlobalStore>(bot: &FileBot<S>, seeds: &[PatientSeed]) -> Vec<String> {
    seeds
        .iter()
        .map(|seed| {
            bot.create("PATIENT", &seed.fields())
                .unwrap_or_else(|e| panic!("Failed to seed {:?}: {e}", seed.name))
        })
        .collect()
}

/// Every `(value, ien)` pair under one cross-reference of a global.
pub fn index_entries(
    store: &InMemoryStore,
    global: &str,
    xref: &str,
) -> BTreeSet<(String, String)> {
    store
        .entries(global)
        .expect("Failed to read entries")
        .into_iter()
        .filter_map(|(subs, _)| match subs.as_slice() {
            [x, value, ien] if x == xref => Some((value.clone(), ien.clone())),
            _ => None,
        })
        .collect()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// An in-memory orchestrator seeded with [`sample_patients`].
    pub fn sample_patient_file() -> (TestFileBot<InMemoryStore>, Vec<String>) {
        let test_bot = TestFileBot::memory();
        let iens = seed_patients(&test_bot.bot, &sample_patients());
        (test_bot, iens)
    }

    /// An in-memory orchestrator with `count` generated patients.
    pub fn populated_patients(count: usize) -> TestFileBot<InMemoryStore> {
        let test_bot = TestFileBot::memory();
        for i in 0..count {
            let name = format!("PATIENT,{}", letters(i));
            test_bot
                .bot
                .create("PATIENT", &[(".01", name.as_str()), (".03", "2850101")])
                .expect("Failed to create patient");
        }
        test_bot
    }

    /// Base-26 letter encoding, since names may not hold digits.
    fn letters(mut n: usize) -> String {
        let mut out = Vec::new();
        loop {
            out.push(b'A' + (n % 26) as u8);
            n /= 26;
            if n == 0 {
                break;
            }
        }
        out.reverse();
        String::from_utf8(out).unwrap_or_default()
    }
}
