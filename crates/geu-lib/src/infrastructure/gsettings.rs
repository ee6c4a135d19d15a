//! [`ShellSettings`] through the `gsettings` command-line tool.

use log::debug;
use std::io;
use std::process::Command;

use crate::domain::{SettingsError, ShellSettings};

/// Schema holding the extension keys.
pub const SHELL_SCHEMA: &str = "org.gnome.shell";
/// Identifiers the shell loads.
pub const ENABLED_EXTENSIONS_KEY: &str = "enabled-extensions";
/// Master switch for per-user extensions.
pub const DISABLE_USER_EXTENSIONS_KEY: &str = "disable-user-extensions";
/// Lets extensions load on shell versions they do not declare.
pub const DISABLE_VERSION_VALIDATION_KEY: &str = "disable-extension-version-validation";

/// Default settings tool.
const GSETTINGS_PROGRAM: &str = "gsettings";

/// One GSettings schema, accessed through the `gsettings` tool.
///
/// Every read and write goes to the settings backend; nothing is cached.
#[derive(Debug, Clone)]
pub struct GSettings {
    /// Settings tool to run.
    program: String,
    /// Schema every key belongs to.
    schema: String,
}

impl GSettings {
    /// Access `schema` through the `gsettings` tool.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            program: GSETTINGS_PROGRAM.to_owned(),
            schema: schema.into(),
        }
    }

    /// The `org.gnome.shell` schema holding the extension keys.
    #[must_use]
    pub fn shell() -> Self {
        Self::new(SHELL_SCHEMA)
    }

    /// Use another executable instead of `gsettings`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Raw GVariant text of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Unavailable`] if the tool cannot be run.
    /// Returns [`SettingsError::Read`] if the tool reports an error.
    pub fn get_raw(&self, key: &'static str) -> Result<String, SettingsError> {
        let output = Command::new(&self.program)
            .args(["get", self.schema.as_str(), key])
            .output()
            .map_err(|e| self.spawn_error(&e))?;

        if !output.status.success() {
            return Err(SettingsError::Read {
                key,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    /// Write GVariant text to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Unavailable`] if the tool cannot be run.
    /// Returns [`SettingsError::Write`] if the tool reports an error.
    pub fn set_raw(&self, key: &'static str, value: &str) -> Result<(), SettingsError> {
        debug!("gsettings set {} {key} {value}", self.schema);
        let output = Command::new(&self.program)
            .args(["set", self.schema.as_str(), key, value])
            .output()
            .map_err(|e| self.spawn_error(&e))?;

        if !output.status.success() {
            return Err(SettingsError::Write {
                key,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if the value is not a boolean.
    pub fn get_bool(&self, key: &'static str) -> Result<bool, SettingsError> {
        let raw = self.get_raw(key)?;
        parse_bool(&raw).ok_or(SettingsError::Parse { key, value: raw })
    }

    /// # Errors
    ///
    /// Returns the error from [`GSettings::set_raw`].
    pub fn set_bool(&self, key: &'static str, value: bool) -> Result<(), SettingsError> {
        self.set_raw(key, if value { "true" } else { "false" })
    }

    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if the value is not a string array.
    pub fn get_strv(&self, key: &'static str) -> Result<Vec<String>, SettingsError> {
        let raw = self.get_raw(key)?;
        parse_strv(&raw).ok_or(SettingsError::Parse { key, value: raw })
    }

    /// # Errors
    ///
    /// Returns the error from [`GSettings::set_raw`].
    pub fn set_strv(&self, key: &'static str, values: &[String]) -> Result<(), SettingsError> {
        self.set_raw(key, &format_strv(values))
    }

    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if the value is not a string.
    pub fn get_string(&self, key: &'static str) -> Result<String, SettingsError> {
        let raw = self.get_raw(key)?;
        parse_string(&raw).ok_or(SettingsError::Parse { key, value: raw })
    }

    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if the value is not an integer.
    pub fn get_int(&self, key: &'static str) -> Result<i64, SettingsError> {
        let raw = self.get_raw(key)?;
        parse_int(&raw).ok_or(SettingsError::Parse { key, value: raw })
    }

    /// Map a failure to run the settings tool.
    fn spawn_error(&self, e: &io::Error) -> SettingsError {
        SettingsError::Unavailable {
            reason: format!("failed to run {}: {e}", self.program),
        }
    }
}

impl ShellSettings for GSettings {
    fn enabled_extensions(&self) -> Result<Vec<String>, SettingsError> {
        self.get_strv(ENABLED_EXTENSIONS_KEY)
    }

    fn set_enabled_extensions(&self, uuids: &[String]) -> Result<(), SettingsError> {
        self.set_strv(ENABLED_EXTENSIONS_KEY, uuids)
    }

    fn user_extensions_disabled(&self) -> Result<bool, SettingsError> {
        self.get_bool(DISABLE_USER_EXTENSIONS_KEY)
    }

    fn set_user_extensions_disabled(&self, disabled: bool) -> Result<(), SettingsError> {
        self.set_bool(DISABLE_USER_EXTENSIONS_KEY, disabled)
    }

    fn version_validation_disabled(&self) -> Result<bool, SettingsError> {
        self.get_bool(DISABLE_VERSION_VALIDATION_KEY)
    }
}

/// Parse a GVariant boolean (`true` / `false`).
#[must_use]
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse a GVariant integer, with or without a type annotation (`8080`, `int32 8080`).
#[must_use]
pub fn parse_int(text: &str) -> Option<i64> {
    text.split_whitespace().last()?.parse().ok()
}

/// Parse a single GVariant string literal (`'foo'`).
#[must_use]
pub fn parse_string(text: &str) -> Option<String> {
    let mut chars = text.trim().chars();
    let quote = chars.next().filter(|&c| matches!(c, '\'' | '"'))?;
    let value = read_quoted(&mut chars, quote)?;
    chars.all(char::is_whitespace).then_some(value)
}

/// Parse a GVariant string array (`['a', 'b']`, `@as []`).
#[must_use]
pub fn parse_strv(text: &str) -> Option<Vec<String>> {
    let text = text.trim();
    let text = text.strip_prefix("@as").map_or(text, str::trim_start);
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(quote) = chars.next() else {
            break;
        };
        if !matches!(quote, '\'' | '"') {
            return None;
        }
        items.push(read_quoted(&mut chars, quote)?);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => {}
            Some(_) => return None,
        }
    }
    Some(items)
}

/// Read up to the closing `quote`, resolving backslash escapes.
fn read_quoted(chars: &mut impl Iterator<Item = char>, quote: char) -> Option<String> {
    let mut value = String::new();
    loop {
        match chars.next()? {
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                other => value.push(other),
            },
            c if c == quote => return Some(value),
            c => value.push(c),
        }
    }
}

/// Format a GVariant string array.
#[must_use]
pub fn format_strv(values: &[String]) -> String {
    if values.is_empty() {
        return "@as []".to_owned();
    }
    let items: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_arrays() {
        assert_eq!(
            parse_strv("['foo@bar', 'dash-to-dock@micxgx.gmail.com']\n").unwrap(),
            vec!["foo@bar".to_owned(), "dash-to-dock@micxgx.gmail.com".to_owned()]
        );
        assert_eq!(parse_strv("@as []").unwrap(), Vec::<String>::new());
        assert_eq!(parse_strv("[]").unwrap(), Vec::<String>::new());
        assert_eq!(parse_strv(r#"["a", 'b']"#).unwrap(), vec!["a", "b"]);
        assert_eq!(parse_strv(r"['it\'s']").unwrap(), vec!["it's"]);
    }

    #[test]
    fn rejects_malformed_arrays() {
        assert!(parse_strv("foo").is_none());
        assert!(parse_strv("['unterminated]").is_none());
        assert!(parse_strv("['a' 'b']").is_none());
        assert!(parse_strv("[a]").is_none());
    }

    #[test]
    fn formats_string_arrays() {
        assert_eq!(format_strv(&[]), "@as []");
        assert_eq!(
            format_strv(&["foo@bar".to_owned(), "x@y".to_owned()]),
            "['foo@bar', 'x@y']"
        );
        assert_eq!(format_strv(&["it's".to_owned()]), r"['it\'s']");
    }

    #[test]
    fn format_then_parse_preserves_order() {
        let values = vec!["b@x".to_owned(), "a@x".to_owned(), "c\\d@x".to_owned()];
        assert_eq!(parse_strv(&format_strv(&values)).unwrap(), values);
    }

    #[test]
    fn parses_scalars() {
        assert_eq!(parse_bool("true\n"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_int("8080"), Some(8080));
        assert_eq!(parse_int("int32 3128"), Some(3128));
        assert_eq!(parse_string("'manual'").as_deref(), Some("manual"));
        assert_eq!(parse_string("''").as_deref(), Some(""));
        assert!(parse_string("manual").is_none());
    }

    #[test]
    fn missing_program_is_unavailable() {
        let settings = GSettings::shell().with_program("/nonexistent/gsettings-for-tests");
        let err = settings.user_extensions_disabled().unwrap_err();
        assert!(matches!(err, SettingsError::Unavailable { .. }));
    }
}
