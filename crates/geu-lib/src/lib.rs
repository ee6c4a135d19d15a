//! Keeps GNOME Shell per-user extensions up to date from extensions.gnome.org.

/// Command orchestration: check, update and recover.
pub mod commands;
/// Configuration from file and environment.
pub mod config;
/// Extension model, decisions and the traits the commands run against.
pub mod domain;
/// D-Bus, GSettings, HTTP and file system implementations.
pub mod infrastructure;
