//! [`UpdateJournal`] implementations.

use log::debug;
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::{JournalError, PendingUpdate, UpdateJournal};

/// File name inside the data directory.
pub const JOURNAL_FILE_NAME: &str = "update-journal.json";

/// Update journal stored as JSON in the data directory.
#[derive(Debug, Clone)]
pub struct FileJournal {
    /// Location of the JSON file.
    path: PathBuf,
}

impl FileJournal {
    /// Journal stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Journal at the standard file name inside `data_dir`.
    #[must_use]
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(JOURNAL_FILE_NAME))
    }

    /// Location of the JSON file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path text used in error messages.
    fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

impl UpdateJournal for FileJournal {
    fn load(&self) -> Result<Option<PendingUpdate>, JournalError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(JournalError::Read {
                    path: self.display_path(),
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| JournalError::Corrupt {
                path: self.display_path(),
                reason: e.to_string(),
            })
    }

    fn record(&self, pending: &PendingUpdate) -> Result<(), JournalError> {
        let write_error = |reason: String| JournalError::Write {
            path: self.display_path(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(pending).map_err(|e| write_error(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written journal.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| write_error(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| write_error(e.to_string()))?;
        debug!("Recorded pending update in {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), JournalError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JournalError::Write {
                path: self.display_path(),
                reason: e.to_string(),
            }),
        }
    }
}

/// In-memory journal for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    /// Recorded entry, if any.
    pending: RefCell<Option<PendingUpdate>>,
}

impl MemoryJournal {
    /// Empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an interrupted run already recorded.
    #[must_use]
    pub fn with_pending(pending: PendingUpdate) -> Self {
        Self {
            pending: RefCell::new(Some(pending)),
        }
    }

    /// Entry currently recorded.
    #[must_use]
    pub fn pending(&self) -> Option<PendingUpdate> {
        self.pending.borrow().clone()
    }
}

impl UpdateJournal for MemoryJournal {
    fn load(&self) -> Result<Option<PendingUpdate>, JournalError> {
        Ok(self.pending.borrow().clone())
    }

    fn record(&self, pending: &PendingUpdate) -> Result<(), JournalError> {
        *self.pending.borrow_mut() = Some(pending.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), JournalError> {
        self.pending.borrow_mut().take();
        Ok(())
    }
}
