//! CLI command implementations.

pub mod compact;
pub mod date;
pub mod inspect;
pub mod node;
pub mod xref;

use crate::error::{CliError, CliResult};
use filebot_storage::JournalStore;
use std::path::Path;

/// Opens an existing journal; never creates one.
pub fn open_journal(path: &Path) -> CliResult<JournalStore> {
    if !path.is_file() {
        return Err(CliError::NoJournal(path.to_path_buf()));
    }
    Ok(JournalStore::open(path)?)
}

#[cfg(test)]
pub(crate) mod testing {
    use filebot_core::FileBot;
    use filebot_storage::JournalStore;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A journal holding three patients, closed so commands can reopen it.
    pub fn patient_journal() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("globals.journal");
        let bot = FileBot::new(JournalStore::open(&path).unwrap()).unwrap();
        for (name, ssn) in [
            ("SMITH,JOHN", "123456789"),
            ("DOE,JANE", "234567890"),
            ("SMITH,ANNA", "345678901"),
        ] {
            bot.create("PATIENT", &[(".01", name), (".03", "2850101"), (".09", ssn)])
                .unwrap();
        }
        drop(bot);
        (dir, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_journal_is_not_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.journal");
        assert!(matches!(open_journal(&path), Err(CliError::NoJournal(_))));
        assert!(!path.exists());
    }
}
