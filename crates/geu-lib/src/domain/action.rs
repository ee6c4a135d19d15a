//! Decisions the service hands back per extension.

use std::fmt;

use super::ExtensionUuid;

/// What the decision service wants done with an installed extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionAction {
    /// Nothing to do. Implied for extensions missing from the response.
    NoOp,
    /// A newer release is available for this shell version.
    Upgrade,
    /// The installed release is newer than any release for this shell version.
    Downgrade,
    /// The extension was pulled from the registry.
    Blacklist,
    /// A tag this client does not know. Treated as [`ExtensionAction::NoOp`].
    Unknown(String),
}

impl ExtensionAction {
    /// Parse an action tag from the decision service response.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "upgrade" => Self::Upgrade,
            "downgrade" => Self::Downgrade,
            "blacklist" => Self::Blacklist,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// Whether the extension should be reinstalled.
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        matches!(self, Self::Upgrade)
    }
}

impl fmt::Display for ExtensionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => f.write_str("no-op"),
            Self::Upgrade => f.write_str("upgrade"),
            Self::Downgrade => f.write_str("downgrade"),
            Self::Blacklist => f.write_str("blacklist"),
            Self::Unknown(tag) => write!(f, "unknown ({tag})"),
        }
    }
}

/// Decisions returned by the decision service, in response order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMap {
    /// One entry per identifier.
    entries: Vec<(ExtensionUuid, ExtensionAction)>,
}

impl ActionMap {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the action for `uuid`. A repeated identifier replaces the earlier action in place.
    pub fn insert(&mut self, uuid: ExtensionUuid, action: ExtensionAction) {
        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| *id == uuid) {
            entry.1 = action;
        } else {
            self.entries.push((uuid, action));
        }
    }

    /// Action for `uuid`; absent entries are [`ExtensionAction::NoOp`].
    #[must_use]
    pub fn action_for(&self, uuid: &ExtensionUuid) -> &ExtensionAction {
        self.entries
            .iter()
            .find(|(id, _)| id == uuid)
            .map_or(&ExtensionAction::NoOp, |(_, action)| action)
    }

    /// Every entry, in response order.
    pub fn iter(&self) -> impl Iterator<Item = (&ExtensionUuid, &ExtensionAction)> {
        self.entries.iter().map(|(uuid, action)| (uuid, action))
    }

    /// Identifiers marked for upgrade, in response order.
    #[must_use]
    pub fn upgrades(&self) -> Vec<ExtensionUuid> {
        self.entries
            .iter()
            .filter(|(_, action)| action.is_upgrade())
            .map(|(uuid, _)| uuid.clone())
            .collect()
    }

    /// Whether any extension is marked for upgrade.
    #[must_use]
    pub fn has_upgrades(&self) -> bool {
        self.entries.iter().any(|(_, action)| action.is_upgrade())
    }

    /// Number of decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the service answered with no decisions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(ExtensionUuid, ExtensionAction)> for ActionMap {
    fn from_iter<T: IntoIterator<Item = (ExtensionUuid, ExtensionAction)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (uuid, action) in iter {
            map.insert(uuid, action);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(s: &str) -> ExtensionUuid {
        ExtensionUuid::parse(s).unwrap()
    }

    #[test]
    fn from_tag_known_and_unknown() {
        assert_eq!(ExtensionAction::from_tag("upgrade"), ExtensionAction::Upgrade);
        assert_eq!(ExtensionAction::from_tag("downgrade"), ExtensionAction::Downgrade);
        assert_eq!(ExtensionAction::from_tag("blacklist"), ExtensionAction::Blacklist);
        assert_eq!(
            ExtensionAction::from_tag("reinstall"),
            ExtensionAction::Unknown("reinstall".to_owned())
        );
        assert_eq!(
            ExtensionAction::from_tag("Upgrade"),
            ExtensionAction::Unknown("Upgrade".to_owned())
        );
    }

    #[test]
    fn absent_entries_are_noop() {
        let map = ActionMap::new();
        assert_eq!(map.action_for(&uuid("foo@bar")), &ExtensionAction::NoOp);
        assert!(!map.has_upgrades());
    }

    #[test]
    fn upgrades_keep_response_order() {
        let map: ActionMap = [
            (uuid("b@x"), ExtensionAction::Upgrade),
            (uuid("a@x"), ExtensionAction::Blacklist),
            (uuid("c@x"), ExtensionAction::Upgrade),
        ]
        .into_iter()
        .collect();

        assert!(map.has_upgrades());
        assert_eq!(map.upgrades(), vec![uuid("b@x"), uuid("c@x")]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut map = ActionMap::new();
        map.insert(uuid("a@x"), ExtensionAction::Upgrade);
        map.insert(uuid("b@x"), ExtensionAction::Upgrade);
        map.insert(uuid("a@x"), ExtensionAction::Downgrade);

        let order: Vec<_> = map.iter().map(|(id, _)| id.as_str().to_owned()).collect();
        assert_eq!(order, vec!["a@x", "b@x"]);
        assert_eq!(map.action_for(&uuid("a@x")), &ExtensionAction::Downgrade);
        assert_eq!(map.upgrades(), vec![uuid("b@x")]);
    }
}
