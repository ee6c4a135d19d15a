//! Runs the commands against the live shell, settings store and decision service.

use log::{debug, info};
use thiserror::Error;

use crate::config::Config;
use crate::domain::{RegistryError, ShellError};
use crate::infrastructure::{
    Backup, BackupError, DbusShell, ExtensionsRegistry, FileJournal, GSettings, InstanceLock,
    LockError, SystemProxyResolver,
};

use super::check::{CheckError, CheckReport};
use super::recover::RecoveryReport;
use super::update::{RunOutcome, UpdateError, UpdateExecutor};

/// Errors that can occur during command orchestration
#[derive(Debug, Error)]
pub enum AppError {
    /// The shell's extension service could not be reached.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// The HTTP client could not be created.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Another run holds the instance lock.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The pre-update backup failed; nothing was modified.
    #[error("backup failed; no extension was modified")]
    Backup(#[from] BackupError),

    /// The check command failed.
    #[error(transparent)]
    Check(#[from] CheckError),

    /// The update or recover command failed.
    #[error(transparent)]
    Update(#[from] UpdateError),
}

/// Decision service client honoring the desktop proxy settings.
fn registry(config: &Config) -> Result<ExtensionsRegistry, RegistryError> {
    let proxies = SystemProxyResolver::detect();
    ExtensionsRegistry::new(config.update_url.clone(), config.timeout, &proxies)
}

/// Run the check command against the live shell and the configured decision service.
///
/// # Errors
///
/// Returns [`AppError::Shell`] if the session bus cannot be reached.
/// Returns [`AppError::Registry`] if the HTTP client cannot be created.
/// Returns [`AppError::Check`] if the check command fails.
pub fn check(config: &Config, enabled_only: bool) -> Result<CheckReport, AppError> {
    let shell = DbusShell::connect()?;
    let settings = GSettings::shell();
    let registry = registry(config)?;

    let report = super::check::run(&shell, &settings, registry, enabled_only)?;
    if !report.resolution.candidates.malformed.is_empty() {
        info!(
            "Skipped {} extension(s) with an invalid identifier.",
            report.resolution.candidates.malformed.len()
        );
    }
    Ok(report)
}

/// Run the update command: lock, back up, then update every extension that needs it.
///
/// # Errors
///
/// Returns [`AppError::Lock`] if another update is running.
/// Returns [`AppError::Backup`] if the backup fails.
/// Returns [`AppError::Shell`] if the session bus cannot be reached.
/// Returns [`AppError::Registry`] if the HTTP client cannot be created.
/// Returns [`AppError::Update`] if the update command fails.
pub fn update(config: &Config, skip_backup: bool) -> Result<RunOutcome, AppError> {
    let _lock = InstanceLock::in_dir(&config.data_dir)?;

    if skip_backup {
        info!("Skipping backup.");
    } else {
        Backup::new(&config.extensions_dir, &config.data_dir).run()?;
    }

    let shell = DbusShell::connect()?;
    let settings = GSettings::shell();
    let registry = registry(config)?;
    let journal = FileJournal::in_dir(&config.data_dir);
    debug!("Update journal at {}", journal.path().display());

    let mut executor = UpdateExecutor::new(&shell, &settings, registry, &journal);
    Ok(executor.run()?)
}

/// Finish an interrupted update, if one was recorded.
///
/// # Errors
///
/// Returns [`AppError::Lock`] if an update is running.
/// Returns [`AppError::Shell`] if the session bus cannot be reached.
/// Returns [`AppError::Update`] if recovery fails.
pub fn recover(config: &Config) -> Result<Option<RecoveryReport>, AppError> {
    let _lock = InstanceLock::in_dir(&config.data_dir)?;

    let journal = FileJournal::in_dir(&config.data_dir);
    if !journal.path().exists() {
        info!("No interrupted update found.");
        return Ok(None);
    }

    let shell = DbusShell::connect()?;
    let settings = GSettings::shell();
    Ok(super::recover::run(&shell, &settings, &journal)?)
}
