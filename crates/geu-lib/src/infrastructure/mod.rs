/// Pre-update archive and dconf dump.
pub mod backup;
/// Shell access over the session bus.
pub mod dbus;
/// Settings access through the `gsettings` tool.
pub mod gsettings;
/// Journal stores.
pub mod journal;
/// Single-instance lock.
pub mod lock;
/// Outbound proxy selection.
pub mod proxy;
/// HTTP client for the decision service.
pub mod registry;

pub use backup::{Backup, BackupError, BackupResult, DCONF_DUMP_NAME, EXTENSIONS_ARCHIVE_NAME};
pub use dbus::DbusShell;
pub use gsettings::GSettings;
pub use journal::{FileJournal, JOURNAL_FILE_NAME, MemoryJournal};
pub use lock::{InstanceLock, LOCK_FILE_NAME, LockError};
pub use proxy::{
    GnomeProxyMode, GnomeProxySettings, ProxyChoice, ProxyResolver, SystemProxyResolver,
};
pub use registry::ExtensionsRegistry;
