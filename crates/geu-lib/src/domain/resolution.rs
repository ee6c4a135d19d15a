//! Candidate selection and the exchange with the decision service.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{ActionMap, ExtensionAction, ExtensionUuid, Snapshot};

/// Errors raised while asking the decision service for actions
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {reason}")]
    ClientInit { reason: String },

    /// The candidate map could not be serialized.
    #[error("failed to encode installed extensions: {reason}")]
    Encode { reason: String },

    /// The request did not complete.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The service answered with a non-success status.
    #[error("decision service returned status {status} for {url}")]
    Status { status: u16, url: String },

    /// The body is not a JSON object of string actions.
    #[error("failed to parse decision service response: {reason}")]
    Parse { reason: String },
}

/// The remote authority deciding what each installed extension should undergo.
pub trait UpdateRegistry {
    /// Ask for the action of every installed extension.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or a malformed body.
    fn fetch_actions(
        &self,
        shell_version: &str,
        installed: &InstalledVersions,
    ) -> Result<ActionMap, RegistryError>;
}

impl<R: UpdateRegistry + ?Sized> UpdateRegistry for &R {
    fn fetch_actions(
        &self,
        shell_version: &str,
        installed: &InstalledVersions,
    ) -> Result<ActionMap, RegistryError> {
        (**self).fetch_actions(shell_version, installed)
    }
}

/// Version descriptor sent for each candidate, serialized as `{"version": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstalledVersion {
    /// Declared version.
    pub version: u32,
}

/// Candidate extensions and their declared versions, as sent to the decision service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InstalledVersions(BTreeMap<ExtensionUuid, InstalledVersion>);

impl InstalledVersions {
    /// Add or replace the version of `uuid`.
    pub fn insert(&mut self, uuid: ExtensionUuid, version: u32) {
        self.0.insert(uuid, InstalledVersion { version });
    }

    /// Version recorded for `uuid`.
    #[must_use]
    pub fn get(&self, uuid: &str) -> Option<u32> {
        self.0
            .iter()
            .find(|(id, _)| id.as_str() == uuid)
            .map(|(_, v)| v.version)
    }

    /// Whether `uuid` is a candidate.
    #[must_use]
    pub fn contains(&self, uuid: &str) -> bool {
        self.get(uuid).is_some()
    }

    /// Candidate identifiers in sorted order.
    pub fn uuids(&self) -> impl Iterator<Item = &ExtensionUuid> {
        self.0.keys()
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there is nothing to ask about.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode as the `installed` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        serde_json::to_string(self).map_err(|e| RegistryError::Encode {
            reason: e.to_string(),
        })
    }
}

/// Extensions eligible for an update request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    /// What gets sent.
    pub installed: InstalledVersions,
    /// Per-user identifiers left out because they break the naming convention.
    pub malformed: Vec<String>,
}

/// Select the per-user extensions to ask about.
///
/// With `enabled_only`, extensions missing from the snapshot's enabled set are skipped.
/// Malformed identifiers are never sent; they are listed in [`Candidates::malformed`].
#[must_use]
pub fn collect_candidates(snapshot: &Snapshot, enabled_only: bool) -> Candidates {
    let mut candidates = Candidates::default();

    for (raw, record) in snapshot.extensions() {
        if !record.is_per_user() {
            continue;
        }
        if enabled_only && !snapshot.is_enabled(raw) {
            continue;
        }
        match ExtensionUuid::parse(raw) {
            Some(uuid) => candidates.installed.insert(uuid, record.declared_version()),
            None => {
                debug!("Excluding malformed extension identifier {raw:?}");
                candidates.malformed.push(raw.clone());
            }
        }
    }

    candidates
}

/// Parse the decision service body: a JSON object mapping identifiers to action tags.
///
/// Keys that are not valid identifiers are dropped.
///
/// # Errors
///
/// Returns [`RegistryError::Parse`] if the body is not such an object.
pub fn parse_actions(body: &str) -> Result<ActionMap, RegistryError> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(body).map_err(|e| RegistryError::Parse {
            reason: e.to_string(),
        })?;

    let mut actions = ActionMap::new();
    for (key, value) in object {
        let serde_json::Value::String(tag) = value else {
            return Err(RegistryError::Parse {
                reason: format!("action for {key:?} is not a string: {value}"),
            });
        };
        match ExtensionUuid::parse(&key) {
            Some(uuid) => actions.insert(uuid, ExtensionAction::from_tag(&tag)),
            None => warn!("Ignoring action for malformed extension identifier {key:?}"),
        }
    }
    Ok(actions)
}

/// Candidates sent and the decisions received for one resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// What was asked about.
    pub candidates: Candidates,
    /// What the service answered.
    pub actions: ActionMap,
}

/// Turns a snapshot into decisions using the decision service.
pub struct UpdateResolver<R: UpdateRegistry> {
    /// Decision service.
    registry: R,
}

impl<R: UpdateRegistry> UpdateResolver<R> {
    /// Resolver asking `registry`.
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// Build the candidate map from `snapshot` and ask the decision service about it.
    ///
    /// # Errors
    ///
    /// Propagates any [`RegistryError`] from the decision service.
    pub fn resolve(
        &self,
        snapshot: &Snapshot,
        enabled_only: bool,
    ) -> Result<Resolution, RegistryError> {
        let candidates = collect_candidates(snapshot, enabled_only);
        if !candidates.malformed.is_empty() {
            debug!(
                "{} extension identifier(s) excluded from the request",
                candidates.malformed.len()
            );
        }

        info!(
            "Checking {} extension(s) for updates (GNOME Shell {})...",
            candidates.installed.len(),
            snapshot.shell_version()
        );
        let actions = self
            .registry
            .fetch_actions(snapshot.shell_version(), &candidates.installed)?;

        for (uuid, action) in actions.iter() {
            if let ExtensionAction::Unknown(tag) = action {
                warn!("Unknown action {tag:?} for {uuid}; leaving it untouched");
            }
        }

        Ok(Resolution {
            candidates,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExtensionKind, ExtensionRecord};

    fn record(kind: ExtensionKind, version: Option<&str>) -> ExtensionRecord {
        ExtensionRecord::new(kind, version.map(str::to_owned))
    }

    fn snapshot() -> Snapshot {
        let extensions = BTreeMap::from([
            ("foo@bar".to_owned(), record(ExtensionKind::PerUser, Some("3"))),
            ("idle@bar".to_owned(), record(ExtensionKind::PerUser, Some("beta"))),
            ("sys@gnome.org".to_owned(), record(ExtensionKind::System, Some("9"))),
            ("bad uuid".to_owned(), record(ExtensionKind::PerUser, Some("2"))),
        ]);
        Snapshot::new(
            "46.2",
            extensions,
            vec!["foo@bar".to_owned(), "sys@gnome.org".to_owned(), "bad uuid".to_owned()],
            false,
            false,
        )
    }

    #[test]
    fn candidates_skip_system_and_malformed() {
        let candidates = collect_candidates(&snapshot(), false);
        assert_eq!(candidates.installed.len(), 2);
        assert_eq!(candidates.installed.get("foo@bar"), Some(3));
        assert_eq!(candidates.installed.get("idle@bar"), Some(1));
        assert!(!candidates.installed.contains("sys@gnome.org"));
        assert_eq!(candidates.malformed, vec!["bad uuid".to_owned()]);
    }

    #[test]
    fn candidates_enabled_only() {
        let candidates = collect_candidates(&snapshot(), true);
        assert_eq!(candidates.installed.len(), 1);
        assert!(candidates.installed.contains("foo@bar"));
        assert_eq!(candidates.malformed, vec!["bad uuid".to_owned()]);
    }

    #[test]
    fn installed_json_shape() {
        let candidates = collect_candidates(&snapshot(), false);
        assert_eq!(
            candidates.installed.to_json().unwrap(),
            r#"{"foo@bar":{"version":3},"idle@bar":{"version":1}}"#
        );
        assert_eq!(InstalledVersions::default().to_json().unwrap(), "{}");
    }

    #[test]
    fn parse_actions_keeps_order_and_drops_malformed() {
        let actions =
            parse_actions(r#"{"z@x": "upgrade", "bad key": "upgrade", "a@x": "blacklist"}"#)
                .unwrap();
        let order: Vec<_> = actions.iter().map(|(id, _)| id.as_str().to_owned()).collect();
        assert_eq!(order, vec!["z@x", "a@x"]);
        assert_eq!(actions.upgrades().len(), 1);
    }

    #[test]
    fn parse_actions_empty_object() {
        assert!(parse_actions("{}").unwrap().is_empty());
    }

    #[test]
    fn parse_actions_rejects_malformed_bodies() {
        assert!(matches!(parse_actions("not json"), Err(RegistryError::Parse { .. })));
        assert!(matches!(parse_actions("[]"), Err(RegistryError::Parse { .. })));
        assert!(matches!(
            parse_actions(r#"{"foo@bar": 1}"#),
            Err(RegistryError::Parse { .. })
        ));
    }
}
