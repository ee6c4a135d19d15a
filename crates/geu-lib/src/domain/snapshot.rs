//! Extension state captured once per run.

use log::debug;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{ExtensionRecord, ExtensionShell, SettingsError, ShellError, ShellSettings};

/// A collaborator could not be read while capturing a snapshot.
///
/// Always fatal: no partial snapshot is ever used.
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    /// The shell could not be queried.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// The settings store could not be read.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Extension state of the live shell at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Running shell version.
    shell_version: String,
    /// Catalog keyed by raw identifier.
    extensions: BTreeMap<String, ExtensionRecord>,
    /// `enabled-extensions`.
    enabled: Vec<String>,
    /// `disable-user-extensions`.
    user_extensions_disabled: bool,
    /// `disable-extension-version-validation`.
    version_validation_disabled: bool,
}

impl Snapshot {
    /// Snapshot from already-read values.
    #[must_use]
    pub fn new(
        shell_version: impl Into<String>,
        extensions: BTreeMap<String, ExtensionRecord>,
        enabled: Vec<String>,
        user_extensions_disabled: bool,
        version_validation_disabled: bool,
    ) -> Self {
        Self {
            shell_version: shell_version.into(),
            extensions,
            enabled,
            user_extensions_disabled,
            version_validation_disabled,
        }
    }

    /// Read the catalog, the enabled set, both flags and the shell version.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Shell`] if the extension service cannot be queried.
    /// Returns [`SnapshotError::Settings`] if the settings store cannot be read.
    pub fn capture<S, T>(shell: &S, settings: &T) -> Result<Self, SnapshotError>
    where
        S: ExtensionShell + ?Sized,
        T: ShellSettings + ?Sized,
    {
        let user_extensions_disabled = settings.user_extensions_disabled()?;
        let version_validation_disabled = settings.version_validation_disabled()?;
        let enabled = settings.enabled_extensions()?;
        let extensions = shell.list_extensions()?;
        let shell_version = shell.shell_version()?;

        debug!(
            "Captured snapshot: shell {shell_version}, {} extension(s), {} enabled, \
             user extensions disabled: {user_extensions_disabled}, \
             version validation disabled: {version_validation_disabled}",
            extensions.len(),
            enabled.len(),
        );

        Ok(Self {
            shell_version,
            extensions,
            enabled,
            user_extensions_disabled,
            version_validation_disabled,
        })
    }

    /// Running shell version.
    #[must_use]
    pub fn shell_version(&self) -> &str {
        &self.shell_version
    }

    /// Every installed extension.
    #[must_use]
    pub fn extensions(&self) -> &BTreeMap<String, ExtensionRecord> {
        &self.extensions
    }

    /// Enabled identifiers, in settings order.
    #[must_use]
    pub fn enabled(&self) -> &[String] {
        &self.enabled
    }

    /// Whether `uuid` is in the enabled set.
    #[must_use]
    pub fn is_enabled(&self, uuid: &str) -> bool {
        self.enabled.iter().any(|e| e == uuid)
    }

    /// Whether user extensions were switched off.
    #[must_use]
    pub fn user_extensions_disabled(&self) -> bool {
        self.user_extensions_disabled
    }

    /// Whether shell version checks were switched off.
    #[must_use]
    pub fn version_validation_disabled(&self) -> bool {
        self.version_validation_disabled
    }
}
