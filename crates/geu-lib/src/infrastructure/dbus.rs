//! [`ExtensionShell`] over the GNOME Shell D-Bus interface.

use log::debug;
use std::collections::{BTreeMap, HashMap};
use zbus::blocking::Connection;
use zbus::zvariant::{OwnedValue, Value};

use crate::domain::{
    ExtensionKind, ExtensionRecord, ExtensionShell, ExtensionUuid, InstallOutcome, ShellError,
};

/// The shell's extension management interface on the session bus.
#[zbus::proxy(
    interface = "org.gnome.Shell.Extensions",
    default_service = "org.gnome.Shell",
    default_path = "/org/gnome/Shell",
    gen_async = false,
    blocking_name = "ShellExtensionsProxyBlocking"
)]
pub trait ShellExtensions {
    /// Every installed extension with its metadata dictionary.
    fn list_extensions(&self) -> zbus::Result<HashMap<String, HashMap<String, OwnedValue>>>;

    /// Download and install `uuid`; answers `successful`, `cancelled` or an error.
    fn install_remote_extension(&self, uuid: &str) -> zbus::Result<String>;

    /// Remove a per-user extension.
    fn uninstall_extension(&self, uuid: &str) -> zbus::Result<bool>;

    /// Errors the shell recorded while loading `uuid`.
    fn get_extension_errors(&self, uuid: &str) -> zbus::Result<Vec<String>>;

    /// Metadata of one extension; empty when it is unknown.
    fn get_extension_info(&self, uuid: &str) -> zbus::Result<HashMap<String, OwnedValue>>;

    /// Running shell version, e.g. `46.2`.
    #[zbus(property)]
    fn shell_version(&self) -> zbus::Result<String>;
}

/// [`ExtensionShell`] backed by the running GNOME Shell over D-Bus.
pub struct DbusShell {
    /// Blocking proxy bound to `org.gnome.Shell`.
    proxy: ShellExtensionsProxyBlocking<'static>,
}

impl DbusShell {
    /// Connect to the session bus and bind the shell's extension interface.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Unavailable`] if the session bus cannot be reached.
    pub fn connect() -> Result<Self, ShellError> {
        let connection = Connection::session().map_err(unavailable)?;
        let proxy = ShellExtensionsProxyBlocking::new(&connection).map_err(unavailable)?;
        Ok(Self { proxy })
    }
}

/// Map a bus failure that means the shell cannot be reached.
fn unavailable(e: zbus::Error) -> ShellError {
    ShellError::Unavailable {
        reason: e.to_string(),
    }
}

/// Map a failed method call, naming the method.
fn call_failed(method: &'static str) -> impl FnOnce(zbus::Error) -> ShellError {
    move |e| ShellError::Call {
        method,
        reason: e.to_string(),
    }
}

impl ExtensionShell for DbusShell {
    fn list_extensions(&self) -> Result<BTreeMap<String, ExtensionRecord>, ShellError> {
        let raw = self.proxy.list_extensions().map_err(unavailable)?;
        Ok(raw
            .into_iter()
            .map(|(uuid, props)| {
                let record = record_from_properties(&props);
                (uuid, record)
            })
            .collect())
    }

    fn shell_version(&self) -> Result<String, ShellError> {
        self.proxy.shell_version().map_err(unavailable)
    }

    fn install_extension(&self, uuid: &ExtensionUuid) -> Result<InstallOutcome, ShellError> {
        debug!("InstallRemoteExtension({uuid})");
        let reply = self
            .proxy
            .install_remote_extension(uuid.as_str())
            .map_err(call_failed("InstallRemoteExtension"))?;
        Ok(InstallOutcome::from_reply(&reply))
    }

    fn uninstall_extension(&self, uuid: &ExtensionUuid) -> Result<bool, ShellError> {
        debug!("UninstallExtension({uuid})");
        self.proxy
            .uninstall_extension(uuid.as_str())
            .map_err(call_failed("UninstallExtension"))
    }

    fn extension_errors(&self, uuid: &ExtensionUuid) -> Result<Vec<String>, ShellError> {
        self.proxy
            .get_extension_errors(uuid.as_str())
            .map_err(call_failed("GetExtensionErrors"))
    }

    fn extension_info(&self, uuid: &ExtensionUuid) -> Result<Option<ExtensionRecord>, ShellError> {
        let props = self
            .proxy
            .get_extension_info(uuid.as_str())
            .map_err(call_failed("GetExtensionInfo"))?;
        // The shell answers with an empty dictionary for unknown extensions.
        if props.is_empty() {
            Ok(None)
        } else {
            Ok(Some(record_from_properties(&props)))
        }
    }
}

/// Build a record from the `a{sv}` dictionary the shell reports per extension.
fn record_from_properties(props: &HashMap<String, OwnedValue>) -> ExtensionRecord {
    let kind = props
        .get("type")
        .and_then(|v| value_as_i64(v))
        .map_or(ExtensionKind::Other(0), ExtensionKind::from_code);
    let version = props.get("version").and_then(|v| value_as_string(v));
    let record = ExtensionRecord::new(kind, version);

    match props.get("name").and_then(|v| value_as_string(v)) {
        Some(name) => record.with_name(name),
        None => record,
    }
}

/// Integer held by a numeric variant, unwrapping nested variants.
fn value_as_i64(value: &Value<'_>) -> Option<i64> {
    match value {
        Value::U8(v) => Some(i64::from(*v)),
        Value::I16(v) => Some(i64::from(*v)),
        Value::U16(v) => Some(i64::from(*v)),
        Value::I32(v) => Some(i64::from(*v)),
        Value::U32(v) => Some(i64::from(*v)),
        Value::I64(v) => Some(*v),
        Value::U64(v) => i64::try_from(*v).ok(),
        // JavaScript numbers travel as doubles.
        #[expect(
            clippy::cast_possible_truncation,
            reason = "finite doubles are truncated toward zero and saturate at the i64 bounds"
        )]
        Value::F64(v) if v.is_finite() => Some(v.trunc() as i64),
        Value::Value(inner) => value_as_i64(inner),
        _ => None,
    }
}

/// Text form of a string or numeric variant.
fn value_as_string(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.as_str().to_owned()),
        Value::F64(v) if v.is_finite() => Some(v.trunc().to_string()),
        Value::Value(inner) => value_as_string(inner),
        other => value_as_i64(other).map(|v| v.to_string()),
    }
}
