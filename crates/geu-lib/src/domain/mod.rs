/// Per-extension decisions.
pub mod action;
/// Extension identifiers and catalog records.
pub mod extension;
/// Crash journal model.
pub mod journal;
/// Asking the decision service.
pub mod resolution;
/// Shell and settings collaborators.
pub mod shell;
/// Point-in-time capture of the shell state.
pub mod snapshot;

pub use action::{ActionMap, ExtensionAction};
pub use extension::{
    DEFAULT_DECLARED_VERSION, ExtensionKind, ExtensionRecord, ExtensionUuid, is_valid_uuid,
    parse_declared_version,
};
pub use journal::{JournalError, PendingUpdate, UpdateJournal};
pub use resolution::{
    Candidates, InstalledVersion, InstalledVersions, RegistryError, Resolution, UpdateRegistry,
    UpdateResolver, collect_candidates, parse_actions,
};
pub use shell::{ExtensionShell, InstallOutcome, SettingsError, ShellError, ShellSettings};
pub use snapshot::{Snapshot, SnapshotError};
