//! Replay of an interrupted update from its journal.

use log::{info, warn};

use crate::domain::{
    ExtensionShell, ExtensionUuid, PendingUpdate, ShellSettings, SnapshotError, UpdateJournal,
};

use super::update::{MutationFailure, UpdateError, install_extension, restore_settings};

/// What recovery did with the journal of an interrupted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Journal entry that was replayed.
    pub pending: PendingUpdate,
    /// Journaled extensions that were missing and got installed again.
    pub reinstalled: Vec<ExtensionUuid>,
    /// Reinstalls that failed.
    pub failures: Vec<MutationFailure>,
}

/// Finish an update that was interrupted between suspending and restoring.
///
/// Journaled extensions missing from the shell are installed again, then the journaled
/// enabled set and flag are written back and the journal is cleared.
///
/// # Errors
///
/// Returns [`UpdateError::Journal`] if the journal cannot be read or cleared.
/// Returns [`UpdateError::Snapshot`] if the shell cannot list its extensions.
/// Returns [`UpdateError::Suspend`] if extensions cannot be suspended before reinstalling
/// missing ones; nothing is installed and the journal is kept.
/// Returns [`UpdateError::Restore`] if settings cannot be written back; the journal is kept.
pub fn run<S, T, J>(
    shell: &S,
    settings: &T,
    journal: &J,
) -> Result<Option<RecoveryReport>, UpdateError>
where
    S: ExtensionShell + ?Sized,
    T: ShellSettings + ?Sized,
    J: UpdateJournal + ?Sized,
{
    let Some(pending) = journal.load()? else {
        return Ok(None);
    };

    warn!(
        "Found an interrupted update of {} extension(s); recovering",
        pending.upgrades.len()
    );

    let installed = shell.list_extensions().map_err(SnapshotError::from)?;
    let missing: Vec<&ExtensionUuid> = pending
        .upgrades
        .iter()
        .filter(|uuid| !installed.contains_key(uuid.as_str()))
        .collect();

    let mut reinstalled = Vec::new();
    let mut failures = Vec::new();
    if !missing.is_empty() {
        // Keep extensions suspended while installing; restore_settings sets the final value.
        settings
            .set_user_extensions_disabled(true)
            .map_err(UpdateError::Suspend)?;
        for uuid in missing {
            info!("Reinstalling {uuid}");
            match install_extension(shell, uuid) {
                Ok(()) => reinstalled.push(uuid.clone()),
                Err(failure) => {
                    warn!("Could not {failure}");
                    failures.push(failure);
                }
            }
        }
    }

    if let Err(errors) = restore_settings(
        settings,
        &pending.enabled,
        pending.user_extensions_disabled,
    ) {
        return Err(UpdateError::Restore { errors, failures });
    }
    journal.clear()?;

    info!("Recovered interrupted update.");
    Ok(Some(RecoveryReport {
        pending,
        reinstalled,
        failures,
    }))
}
