//! The two collaborators an update drives: the shell and its settings store.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::{ExtensionRecord, ExtensionUuid};

/// Errors raised by the shell's extension service
#[derive(Debug, Clone, Error)]
pub enum ShellError {
    /// The session bus or the shell's extension service could not be reached.
    #[error("GNOME Shell extension service is unavailable: {reason}")]
    Unavailable { reason: String },

    /// A call on the extension service failed.
    #[error("{method} failed: {reason}")]
    Call {
        /// D-Bus method name.
        method: &'static str,
        /// Error reported by the bus.
        reason: String,
    },
}

/// Errors raised by the settings store
#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    /// The settings backend could not be run.
    #[error("settings store is unavailable: {reason}")]
    Unavailable { reason: String },

    /// A key could not be read.
    #[error("failed to read {key}: {reason}")]
    Read { key: &'static str, reason: String },

    /// A key could not be written.
    #[error("failed to write {key}: {reason}")]
    Write { key: &'static str, reason: String },

    /// A key held a value of an unexpected shape.
    #[error("unexpected value for {key}: {value}")]
    Parse { key: &'static str, value: String },
}

/// Result of asking the shell to install an extension from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The extension was downloaded and installed.
    Installed,
    /// The user dismissed the shell's install confirmation.
    Cancelled,
    /// Any other reply, kept verbatim.
    Other(String),
}

impl InstallOutcome {
    /// Map the string returned by `InstallRemoteExtension`.
    #[must_use]
    pub fn from_reply(reply: &str) -> Self {
        match reply {
            "successful" => Self::Installed,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => f.write_str("successful"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Other(reply) => f.write_str(reply),
        }
    }
}

/// The live extension subsystem of the running shell.
pub trait ExtensionShell {
    /// List every extension the shell knows about, keyed by raw identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension service cannot be reached.
    fn list_extensions(&self) -> Result<BTreeMap<String, ExtensionRecord>, ShellError>;

    /// Version string of the running shell (e.g. "46.2").
    ///
    /// # Errors
    ///
    /// Returns an error if the extension service cannot be reached.
    fn shell_version(&self) -> Result<String, ShellError>;

    /// Download and install an extension from the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    fn install_extension(&self, uuid: &ExtensionUuid) -> Result<InstallOutcome, ShellError>;

    /// Remove an installed extension. Returns whether the shell removed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    fn uninstall_extension(&self, uuid: &ExtensionUuid) -> Result<bool, ShellError>;

    /// Errors the shell recorded while loading an extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    fn extension_errors(&self, uuid: &ExtensionUuid) -> Result<Vec<String>, ShellError>;

    /// Metadata for one extension, `None` if the shell does not know it.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    fn extension_info(&self, uuid: &ExtensionUuid) -> Result<Option<ExtensionRecord>, ShellError>;
}

/// The shell's persisted configuration keys used during an update.
///
/// This is shared mutable state outside the process; implementations must not cache.
pub trait ShellSettings {
    /// # Errors
    ///
    /// Returns an error if the key cannot be read or parsed.
    fn enabled_extensions(&self) -> Result<Vec<String>, SettingsError>;

    /// # Errors
    ///
    /// Returns an error if the key cannot be written.
    fn set_enabled_extensions(&self, uuids: &[String]) -> Result<(), SettingsError>;

    /// # Errors
    ///
    /// Returns an error if the key cannot be read or parsed.
    fn user_extensions_disabled(&self) -> Result<bool, SettingsError>;

    /// # Errors
    ///
    /// Returns an error if the key cannot be written.
    fn set_user_extensions_disabled(&self, disabled: bool) -> Result<(), SettingsError>;

    /// # Errors
    ///
    /// Returns an error if the key cannot be read or parsed.
    fn version_validation_disabled(&self) -> Result<bool, SettingsError>;
}
