//! Extension identifiers and catalog entries.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Naming convention for extension UUIDs as published on extensions.gnome.org.
static UUID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9@._]+$").ok());

/// Check whether `uuid` follows the extension UUID guidelines.
///
/// Accepts non-empty strings made only of ASCII letters, digits, `-`, `_`, `.` and `@`.
#[must_use]
pub fn is_valid_uuid(uuid: &str) -> bool {
    UUID_PATTERN.as_ref().is_some_and(|re| re.is_match(uuid))
}

/// Validated extension identifier (e.g. "dash-to-dock@micxgx.gmail.com")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtensionUuid(String);

impl ExtensionUuid {
    /// Parse a raw identifier, returning `None` when it does not follow the naming convention.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_uuid(raw).then(|| Self(raw.to_owned()))
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ExtensionUuid {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_uuid(&value) {
            Ok(Self(value))
        } else {
            Err(format!("invalid extension uuid: {value:?}"))
        }
    }
}

impl From<ExtensionUuid> for String {
    fn from(uuid: ExtensionUuid) -> Self {
        uuid.0
    }
}

/// Where an extension is installed, as reported by the shell's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    /// Bundled with the system (type 1).
    System,
    /// Installed by and owned by the current user (type 2).
    PerUser,
    /// Any other code the shell may report.
    Other(i64),
}

impl ExtensionKind {
    /// Map the numeric type code used by the shell's extension utilities.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::System,
            2 => Self::PerUser,
            other => Self::Other(other),
        }
    }

    /// Numeric type code, the inverse of [`ExtensionKind::from_code`].
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::System => 1,
            Self::PerUser => 2,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::PerUser => f.write_str("per-user"),
            Self::Other(code) => write!(f, "type {code}"),
        }
    }
}

/// One entry of the shell's extension catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    /// Install location.
    pub kind: ExtensionKind,
    /// Version as declared in the extension metadata, unparsed.
    pub version: Option<String>,
    /// Human readable name, when the shell provides one.
    pub name: Option<String>,
}

impl ExtensionRecord {
    /// Record without a display name.
    #[must_use]
    pub fn new(kind: ExtensionKind, version: Option<String>) -> Self {
        Self {
            kind,
            version,
            name: None,
        }
    }

    /// Attach the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Only per-user extensions are ever upgraded.
    #[must_use]
    pub fn is_per_user(&self) -> bool {
        self.kind == ExtensionKind::PerUser
    }

    /// The declared version as an integer, see [`parse_declared_version`].
    #[must_use]
    pub fn declared_version(&self) -> u32 {
        parse_declared_version(self.version.as_deref())
    }
}

/// Version assumed for extensions whose metadata has no usable version.
pub const DEFAULT_DECLARED_VERSION: u32 = 1;

/// Parse a declared extension version.
///
/// Missing or non-numeric values fall back to [`DEFAULT_DECLARED_VERSION`].
#[must_use]
pub fn parse_declared_version(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_DECLARED_VERSION)
}
