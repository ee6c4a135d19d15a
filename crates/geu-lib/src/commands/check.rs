//! Read-only comparison of installed extensions against the decision service.

use log::{debug, info};
use thiserror::Error;

use crate::domain::{
    ActionMap, ExtensionAction, ExtensionShell, ExtensionUuid, RegistryError, Resolution,
    ShellSettings, Snapshot, SnapshotError, UpdateRegistry, UpdateResolver,
};

/// Errors that can occur during the check command
#[derive(Debug, Error)]
pub enum CheckError {
    /// The shell or the settings store could not be read.
    #[error("could not read the current extension state")]
    Snapshot(#[from] SnapshotError),

    /// The decision service failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What a check found. Nothing is modified by a check.
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// State the check ran against.
    pub snapshot: Snapshot,
    /// Candidates sent and the answers received.
    pub resolution: Resolution,
}

impl CheckReport {
    /// Extensions the decision service wants upgraded.
    #[must_use]
    pub fn upgrades(&self) -> Vec<ExtensionUuid> {
        self.resolution.actions.upgrades()
    }
}

/// Ask the decision service which installed extensions need attention.
///
/// With `enabled_only`, only extensions in the enabled set are sent.
///
/// # Errors
///
/// Returns [`CheckError::Snapshot`] if the shell or settings cannot be read.
/// Returns [`CheckError::Registry`] if the decision service fails.
pub fn run<S, T, R>(
    shell: &S,
    settings: &T,
    registry: R,
    enabled_only: bool,
) -> Result<CheckReport, CheckError>
where
    S: ExtensionShell + ?Sized,
    T: ShellSettings + ?Sized,
    R: UpdateRegistry,
{
    let snapshot = Snapshot::capture(shell, settings)?;
    log_catalog(&snapshot);

    let resolution = UpdateResolver::new(registry).resolve(&snapshot, enabled_only)?;
    log_actions(&resolution.actions);

    let upgrades = resolution.actions.upgrades();
    if upgrades.is_empty() {
        info!("All extensions are up to date.");
    } else {
        info!("{} extension(s) can be upgraded.", upgrades.len());
    }

    Ok(CheckReport {
        snapshot,
        resolution,
    })
}

/// Log the installed extensions.
pub(crate) fn log_catalog(snapshot: &Snapshot) {
    info!(
        "GNOME Shell {}: {} extension(s) installed",
        snapshot.shell_version(),
        snapshot.extensions().len()
    );
    for (uuid, record) in snapshot.extensions() {
        let state = if snapshot.is_enabled(uuid) {
            "enabled"
        } else {
            "disabled"
        };
        let version = record.version.as_deref().unwrap_or("-");
        match &record.name {
            Some(name) => info!("  {uuid} ({name}) v{version} [{}, {state}]", record.kind),
            None => info!("  {uuid} v{version} [{}, {state}]", record.kind),
        }
    }
}

/// Log the decision for every extension the service answered about.
pub(crate) fn log_actions(actions: &ActionMap) {
    if actions.is_empty() {
        info!("The decision service returned no actions.");
        return;
    }
    for (uuid, action) in actions.iter() {
        match action {
            ExtensionAction::Upgrade => info!("+ {uuid}: {action}"),
            ExtensionAction::NoOp => debug!("  {uuid}: {action}"),
            _ => info!("  {uuid}: {action}"),
        }
    }
}
