//! Upgrade of every extension the decision service marks, with the subsystem suspended.

use log::{debug, error, info, warn};
use std::fmt;
use thiserror::Error;

use crate::domain::{
    ExtensionShell, ExtensionUuid, InstallOutcome, JournalError, PendingUpdate, RegistryError,
    Resolution, SettingsError, ShellSettings, Snapshot, SnapshotError, UpdateJournal,
    UpdateRegistry, UpdateResolver,
};

use super::check::{log_actions, log_catalog};
use super::recover::{self, RecoveryReport};

/// Phases of one update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Not started.
    Idle,
    /// Capturing the shell state.
    Snapshotting,
    /// Waiting on the decision service.
    Resolving,
    /// Finished without upgrades.
    NothingToDo,
    /// Extensions suspended, upgrades in progress.
    Applying,
    /// Writing the captured settings back.
    Restoring,
    /// Finished with upgrades applied.
    Done,
    /// Stopped on an error.
    Failed,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Snapshotting => "snapshotting",
            Self::Resolving => "resolving",
            Self::NothingToDo => "nothing to do",
            Self::Applying => "applying",
            Self::Restoring => "restoring",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which half of an upgrade pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStep {
    /// Removing the installed copy.
    Uninstall,
    /// Fetching the new copy from the registry.
    Install,
}

impl fmt::Display for MutationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninstall => f.write_str("uninstall"),
            Self::Install => f.write_str("install"),
        }
    }
}

/// An install or uninstall call that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFailure {
    /// Extension being upgraded.
    pub uuid: ExtensionUuid,
    /// Step that failed.
    pub step: MutationStep,
    /// Error text or unexpected reply.
    pub reason: String,
}

impl MutationFailure {
    /// Failure of `step` for `uuid`.
    #[must_use]
    pub fn new(uuid: &ExtensionUuid, step: MutationStep, reason: impl Into<String>) -> Self {
        Self {
            uuid: uuid.clone(),
            step,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.step, self.uuid, self.reason)
    }
}

/// Settings as written back at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredState {
    /// Enabled set written back.
    pub enabled: Vec<String>,
    /// `disable-user-extensions` written back.
    pub user_extensions_disabled: bool,
    /// `disable-extension-version-validation` as captured; never written.
    pub version_validation_disabled: bool,
}

impl RestoredState {
    /// Values captured before the run.
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            enabled: snapshot.enabled().to_vec(),
            user_extensions_disabled: snapshot.user_extensions_disabled(),
            version_validation_disabled: snapshot.version_validation_disabled(),
        }
    }
}

/// Result of a successful update run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// No extension needed an upgrade; nothing was touched.
    NothingToDo {
        /// State before the run.
        snapshot: Snapshot,
        /// Answers from the decision service.
        resolution: Resolution,
    },
    /// Upgrades were applied and the settings restored.
    Applied {
        /// State before the run.
        snapshot: Snapshot,
        /// Answers from the decision service.
        resolution: Resolution,
        /// Extensions reinstalled successfully.
        upgraded: Vec<ExtensionUuid>,
        /// Settings written back.
        restored: RestoredState,
    },
}

/// Errors that can occur during the update command
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The shell or the settings store could not be read. Nothing was modified.
    #[error("could not read the current extension state")]
    Snapshot(#[from] SnapshotError),

    /// The decision service failed. Nothing was modified.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The update journal could not be read, written or cleared.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// User extensions could not be suspended; settings were put back.
    #[error("failed to suspend user extensions")]
    Suspend(#[source] SettingsError),

    /// Some upgrade steps failed. Settings were restored regardless.
    #[error(
        "{} upgrade step(s) failed: {}",
        .failures.len(),
        join_failures(.failures)
    )]
    Mutation {
        /// Failed steps, in order.
        failures: Vec<MutationFailure>,
        /// Extensions that did upgrade.
        upgraded: Vec<ExtensionUuid>,
        /// Settings written back.
        restored: RestoredState,
    },

    /// Settings could not be written back. The journal is kept for `recover`.
    #[error(
        "failed to restore extension settings ({} error(s)); run `recover` to retry",
        .errors.len()
    )]
    Restore {
        /// Failed writes.
        errors: Vec<SettingsError>,
        /// Upgrade steps that also failed.
        failures: Vec<MutationFailure>,
    },
}

/// One line listing every failure.
fn join_failures(failures: &[MutationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Write back the enabled set, then the `disable-user-extensions` flag.
///
/// Both writes are attempted even if the first one fails.
///
/// # Errors
///
/// Returns every [`SettingsError`] raised by the two writes.
pub fn restore_settings<T: ShellSettings + ?Sized>(
    settings: &T,
    enabled: &[String],
    user_extensions_disabled: bool,
) -> Result<(), Vec<SettingsError>> {
    let mut errors = Vec::new();
    if let Err(e) = settings.set_enabled_extensions(enabled) {
        errors.push(e);
    }
    if let Err(e) = settings.set_user_extensions_disabled(user_extensions_disabled) {
        errors.push(e);
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Holds the extension subsystem suspended and restores the captured settings when released.
///
/// Restoration also runs on drop if [`SuspendGuard::release`] was never reached.
pub struct SuspendGuard<'a, T: ShellSettings + ?Sized> {
    /// Store the captured values are written to.
    settings: &'a T,
    /// Enabled set to restore.
    enabled: &'a [String],
    /// Flag value to restore.
    user_extensions_disabled: bool,
    /// Cleared once restoration ran.
    armed: bool,
}

impl<'a, T: ShellSettings + ?Sized> SuspendGuard<'a, T> {
    /// Suspend user extensions. On failure the captured flag is written back before returning.
    ///
    /// # Errors
    ///
    /// Returns the [`SettingsError`] raised while setting the flag.
    pub fn engage(settings: &'a T, snapshot: &'a Snapshot) -> Result<Self, SettingsError> {
        let mut guard = Self {
            settings,
            enabled: snapshot.enabled(),
            user_extensions_disabled: snapshot.user_extensions_disabled(),
            armed: true,
        };
        if let Err(e) = settings.set_user_extensions_disabled(true) {
            if let Err(errors) = guard.release() {
                for err in errors {
                    error!("Could not put settings back: {err}");
                }
            }
            return Err(e);
        }
        Ok(guard)
    }

    /// Restore the enabled set and the flag captured at engage time.
    ///
    /// # Errors
    ///
    /// Returns the errors raised while writing the settings back.
    pub fn release(&mut self) -> Result<(), Vec<SettingsError>> {
        self.armed = false;
        restore_settings(self.settings, self.enabled, self.user_extensions_disabled)
    }
}

impl<T: ShellSettings + ?Sized> Drop for SuspendGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Update interrupted; restoring extension settings");
            if let Err(errors) = self.release() {
                for err in errors {
                    error!("Could not restore settings: {err}");
                }
            }
        }
    }
}

/// Runs snapshot, resolve, apply and restore against the live shell.
pub struct UpdateExecutor<'a, S, T, R, J>
where
    S: ExtensionShell + ?Sized,
    T: ShellSettings + ?Sized,
    R: UpdateRegistry,
    J: UpdateJournal + ?Sized,
{
    shell: &'a S,
    settings: &'a T,
    resolver: UpdateResolver<R>,
    journal: &'a J,
    phase: UpdatePhase,
    recovered: Option<RecoveryReport>,
}

impl<'a, S, T, R, J> UpdateExecutor<'a, S, T, R, J>
where
    S: ExtensionShell + ?Sized,
    T: ShellSettings + ?Sized,
    R: UpdateRegistry,
    J: UpdateJournal + ?Sized,
{
    /// Executor in [`UpdatePhase::Idle`] over the given collaborators.
    #[must_use]
    pub fn new(shell: &'a S, settings: &'a T, registry: R, journal: &'a J) -> Self {
        Self {
            shell,
            settings,
            resolver: UpdateResolver::new(registry),
            journal,
            phase: UpdatePhase::Idle,
            recovered: None,
        }
    }

    /// Current phase; [`UpdatePhase::Done`], [`UpdatePhase::NothingToDo`] or
    /// [`UpdatePhase::Failed`] once [`UpdateExecutor::run`] returned.
    #[must_use]
    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    /// Move to `next`.
    fn enter(&mut self, next: UpdatePhase) {
        debug!("Update phase: {} -> {next}", self.phase);
        self.phase = next;
    }

    /// Report of the recovery performed at the start of [`UpdateExecutor::run`], if any.
    #[must_use]
    pub fn recovered(&self) -> Option<&RecoveryReport> {
        self.recovered.as_ref()
    }

    /// Run one full update pass, recovering an interrupted run first.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Snapshot`] or [`UpdateError::Registry`] before anything is modified.
    /// Returns [`UpdateError::Mutation`] if some upgrade steps failed; settings are restored.
    /// Returns [`UpdateError::Restore`] if settings could not be written back.
    pub fn run(&mut self) -> Result<RunOutcome, UpdateError> {
        let result = self.run_phases();
        if result.is_err() {
            self.enter(UpdatePhase::Failed);
        }
        result
    }

    /// Body of [`UpdateExecutor::run`], without the failure bookkeeping.
    fn run_phases(&mut self) -> Result<RunOutcome, UpdateError> {
        // A journal left by an interrupted run must be settled before taking a new snapshot.
        self.recovered = recover::run(self.shell, self.settings, self.journal)?;

        self.enter(UpdatePhase::Snapshotting);
        let snapshot = Snapshot::capture(self.shell, self.settings)?;
        log_catalog(&snapshot);

        self.enter(UpdatePhase::Resolving);
        let resolution = self.resolver.resolve(&snapshot, false)?;
        log_actions(&resolution.actions);

        if !resolution.actions.has_upgrades() {
            self.enter(UpdatePhase::NothingToDo);
            info!("Nothing to do.");
            return Ok(RunOutcome::NothingToDo {
                snapshot,
                resolution,
            });
        }

        let upgrades = resolution.actions.upgrades();
        self.journal
            .record(&PendingUpdate::from_snapshot(&snapshot, upgrades.clone()))?;

        self.enter(UpdatePhase::Applying);
        let (upgraded, failures, restore_result) = {
            let mut guard = match SuspendGuard::engage(self.settings, &snapshot) {
                Ok(guard) => guard,
                Err(e) => {
                    self.journal.clear()?;
                    return Err(UpdateError::Suspend(e));
                }
            };
            let (upgraded, failures) = apply_upgrades(self.shell, &upgrades);

            self.enter(UpdatePhase::Restoring);
            let restore_result = guard.release();
            (upgraded, failures, restore_result)
        };

        if let Err(errors) = restore_result {
            for err in &errors {
                error!("Could not restore settings: {err}");
            }
            return Err(UpdateError::Restore { errors, failures });
        }
        self.journal.clear()?;

        let restored = RestoredState::from_snapshot(&snapshot);
        if !failures.is_empty() {
            return Err(UpdateError::Mutation {
                failures,
                upgraded,
                restored,
            });
        }

        self.enter(UpdatePhase::Done);
        info!("{} extension(s) updated.", upgraded.len());
        Ok(RunOutcome::Applied {
            snapshot,
            resolution,
            upgraded,
            restored,
        })
    }
}

/// Uninstall then install every extension in `upgrades`, in order.
///
/// A failed uninstall skips the install for that extension. Failures never stop the loop.
pub fn apply_upgrades<S: ExtensionShell + ?Sized>(
    shell: &S,
    upgrades: &[ExtensionUuid],
) -> (Vec<ExtensionUuid>, Vec<MutationFailure>) {
    let mut upgraded = Vec::new();
    let mut failures = Vec::new();

    for uuid in upgrades {
        info!("Upgrading {uuid}");
        match shell.uninstall_extension(uuid) {
            Ok(true) => {}
            Ok(false) => {
                failures.push(MutationFailure::new(
                    uuid,
                    MutationStep::Uninstall,
                    "the shell did not remove the extension",
                ));
                continue;
            }
            Err(e) => {
                failures.push(MutationFailure::new(uuid, MutationStep::Uninstall, e.to_string()));
                continue;
            }
        }

        match install_extension(shell, uuid) {
            Ok(()) => upgraded.push(uuid.clone()),
            Err(failure) => failures.push(failure),
        }
    }

    for failure in &failures {
        warn!("Could not {failure}");
    }
    (upgraded, failures)
}

/// Install one extension and report anything the shell logged for it.
pub(crate) fn install_extension<S: ExtensionShell + ?Sized>(
    shell: &S,
    uuid: &ExtensionUuid,
) -> Result<(), MutationFailure> {
    match shell.install_extension(uuid) {
        Ok(InstallOutcome::Installed) => {}
        Ok(other) => {
            return Err(MutationFailure::new(
                uuid,
                MutationStep::Install,
                format!("install reported {other}"),
            ));
        }
        Err(e) => {
            return Err(MutationFailure::new(uuid, MutationStep::Install, e.to_string()));
        }
    }

    match shell.extension_info(uuid) {
        Ok(Some(record)) => debug!(
            "{uuid} is now at version {}",
            record.version.as_deref().unwrap_or("unknown")
        ),
        Ok(None) => warn!("{uuid} is not listed by the shell after install"),
        Err(e) => debug!("Could not query {uuid} after install: {e}"),
    }
    match shell.extension_errors(uuid) {
        Ok(errors) => {
            for message in errors {
                warn!("{uuid}: {message}");
            }
        }
        Err(e) => debug!("Could not query errors for {uuid}: {e}"),
    }
    Ok(())
}
