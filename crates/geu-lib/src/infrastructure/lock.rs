//! Advisory file lock serializing update runs.

use fs4::fs_std::FileExt;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name inside the data directory.
pub const LOCK_FILE_NAME: &str = "update.lock";

/// Errors that can occur while taking the instance lock
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock file could not be opened or locked.
    #[error("failed to open lock file {}", path.display())]
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Another process holds the lock.
    #[error("another update is already running (lock held on {})", path.display())]
    Busy { path: PathBuf },
}

/// Exclusive advisory lock that keeps two updates from running at once.
///
/// Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    /// Lock file path.
    path: PathBuf,
    /// Open handle carrying the lock.
    _file: File,
}

impl InstanceLock {
    /// Take the lock at `path` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] if another process holds the lock.
    /// Returns [`LockError::Io`] if the lock file cannot be opened.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let io_error = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(io_error)?;

        if !FileExt::try_lock_exclusive(&file).map_err(io_error)? {
            return Err(LockError::Busy { path });
        }

        // Holder's pid, for whoever finds the lock busy.
        file.set_len(0).map_err(io_error)?;
        writeln!(file, "{}", std::process::id()).map_err(io_error)?;
        debug!("Acquired {}", path.display());

        Ok(Self { path, _file: file })
    }

    /// Lock at the standard file name inside `data_dir`.
    ///
    /// # Errors
    ///
    /// See [`InstanceLock::acquire`].
    pub fn in_dir(data_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(data_dir.join(LOCK_FILE_NAME))
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
