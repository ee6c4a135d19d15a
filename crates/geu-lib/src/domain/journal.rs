//! Record of an update in flight, kept until the settings are restored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ExtensionUuid, Snapshot};

/// Errors raised by the update journal
#[derive(Debug, Clone, Error)]
pub enum JournalError {
    /// The journal exists but could not be read.
    #[error("failed to read update journal {path}: {reason}")]
    Read { path: String, reason: String },

    /// The journal could not be written or removed.
    #[error("failed to write update journal {path}: {reason}")]
    Write { path: String, reason: String },

    /// The journal does not hold a pending update.
    #[error("update journal {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

/// State written down before the extension subsystem is suspended.
///
/// If a run dies between suspending and restoring, this is what recovery puts back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    /// Enabled set before the run.
    pub enabled: Vec<String>,
    /// `disable-user-extensions` before the run.
    pub user_extensions_disabled: bool,
    /// Extensions that may be mid-upgrade.
    pub upgrades: Vec<ExtensionUuid>,
}

impl PendingUpdate {
    /// Record the settings of `snapshot` before upgrading `upgrades`.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot, upgrades: Vec<ExtensionUuid>) -> Self {
        Self {
            enabled: snapshot.enabled().to_vec(),
            user_extensions_disabled: snapshot.user_extensions_disabled(),
            upgrades,
        }
    }
}

/// Durable record of an update in progress.
pub trait UpdateJournal {
    /// The pending update left by an interrupted run, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal exists but cannot be read.
    fn load(&self) -> Result<Option<PendingUpdate>, JournalError>;

    /// # Errors
    ///
    /// Returns an error if the journal cannot be written.
    fn record(&self, pending: &PendingUpdate) -> Result<(), JournalError>;

    /// # Errors
    ///
    /// Returns an error if the journal cannot be removed.
    fn clear(&self) -> Result<(), JournalError>;
}
