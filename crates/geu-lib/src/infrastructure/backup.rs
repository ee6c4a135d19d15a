//! Safety copy of extension files and desktop configuration, taken before an update.

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Archive of the per-user extension directory.
pub const EXTENSIONS_ARCHIVE_NAME: &str = "pre-update-extensions.tar.gz";
/// Dump of the whole dconf database.
pub const DCONF_DUMP_NAME: &str = "pre-update.dconf";

/// Errors that can occur while taking a backup
#[derive(Debug, Error)]
pub enum BackupError {
    /// The output directory could not be created.
    #[error("failed to create backup directory {path}")]
    CreateDir {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The extension directory could not be archived.
    #[error("failed to archive {source_dir} into {archive}")]
    Archive {
        /// Directory being archived.
        source_dir: PathBuf,
        /// Archive destination.
        archive: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The dconf tool could not be started.
    #[error("failed to run {program}")]
    Spawn {
        /// Executable name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The dconf tool failed.
    #[error("{program} exited with {status}: {stderr}")]
    Export {
        /// Executable name.
        program: String,
        /// Exit status.
        status: std::process::ExitStatus,
        /// Trimmed error output.
        stderr: String,
    },

    /// A backup file could not be written or moved into place.
    #[error("failed to write {path}")]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Files written by one backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    /// The extensions archive.
    pub archive_path: PathBuf,
    /// The dconf dump.
    pub dconf_path: PathBuf,
}

/// Archives the extensions directory and dumps the dconf database.
#[derive(Debug, Clone)]
pub struct Backup {
    /// Directory to archive.
    extensions_dir: PathBuf,
    /// Where both files go.
    output_dir: PathBuf,
    /// Executable run as `<program> dump /`.
    dconf_program: String,
}

impl Backup {
    /// Back up `extensions_dir` into `output_dir`.
    #[must_use]
    pub fn new(extensions_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            extensions_dir: extensions_dir.into(),
            output_dir: output_dir.into(),
            dconf_program: "dconf".to_owned(),
        }
    }

    /// Use another executable instead of `dconf`.
    #[must_use]
    pub fn with_dconf_program(mut self, program: impl Into<String>) -> Self {
        self.dconf_program = program.into();
        self
    }

    /// Write both backup files, replacing the ones from a previous run.
    ///
    /// Both files are first written next to their final names and only moved into place
    /// once both succeeded, so a failed run leaves the previous backup intact.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] if either file cannot be produced.
    pub fn run(&self) -> Result<BackupResult, BackupError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| BackupError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let archive_path = self.output_dir.join(EXTENSIONS_ARCHIVE_NAME);
        let dconf_path = self.output_dir.join(DCONF_DUMP_NAME);
        let archive_tmp = staging_path(&archive_path);
        let dconf_tmp = staging_path(&dconf_path);

        let staged = self.stage(&archive_tmp, &archive_path, &dconf_tmp);
        let committed = staged
            .and_then(|()| commit(&archive_tmp, &archive_path))
            .and_then(|()| commit(&dconf_tmp, &dconf_path));
        if let Err(e) = committed {
            discard(&archive_tmp);
            discard(&dconf_tmp);
            return Err(e);
        }

        info!("Backed up extensions to {}", archive_path.display());
        info!("Backed up settings to {}", dconf_path.display());
        Ok(BackupResult {
            archive_path,
            dconf_path,
        })
    }

    /// Write the archive and the dconf dump to their staging paths.
    fn stage(
        &self,
        archive_tmp: &Path,
        archive_path: &Path,
        dconf_tmp: &Path,
    ) -> Result<(), BackupError> {
        archive_directory(&self.extensions_dir, archive_tmp).map_err(|source| {
            BackupError::Archive {
                source_dir: self.extensions_dir.clone(),
                archive: archive_path.to_path_buf(),
                source,
            }
        })?;
        self.dump_dconf(dconf_tmp)
    }

    /// Export the whole dconf database into `path`.
    fn dump_dconf(&self, path: &Path) -> Result<(), BackupError> {
        let output = Command::new(&self.dconf_program)
            .args(["dump", "/"])
            .output()
            .map_err(|source| BackupError::Spawn {
                program: self.dconf_program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BackupError::Export {
                program: self.dconf_program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        fs::write(path, &output.stdout).map_err(|source| BackupError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Sibling of `path` that a file is written to before being moved into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Move a staged file over its final name.
fn commit(staged: &Path, path: &Path) -> Result<(), BackupError> {
    fs::rename(staged, path).map_err(|source| BackupError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove a leftover staging file.
fn discard(staged: &Path) {
    if let Err(e) = fs::remove_file(staged)
        && e.kind() != io::ErrorKind::NotFound
    {
        debug!("Could not remove {}: {e}", staged.display());
    }
}

/// Write `source_dir` as a gzip-compressed tar at `archive_path`.
///
/// Entries are stored under the directory's own name. A missing directory yields an
/// archive with no entries.
///
/// # Errors
///
/// Returns any I/O error from reading the directory or writing the archive.
pub fn archive_directory(source_dir: &Path, archive_path: &Path) -> io::Result<()> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    if source_dir.is_dir() {
        let name = source_dir
            .file_name()
            .map_or_else(|| PathBuf::from("extensions"), PathBuf::from);
        builder.append_dir_all(&name, source_dir)?;
    } else {
        debug!("{} does not exist; writing an empty archive", source_dir.display());
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    fn entries(archive: &Path) -> Vec<String> {
        let file = File::open(archive).unwrap();
        let mut reader = tar::Archive::new(GzDecoder::new(file));
        let mut names: Vec<String> = reader
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn archives_extension_files() {
        let dir = tempfile::tempdir().unwrap();
        let extensions = dir.path().join("extensions");
        fs::create_dir_all(extensions.join("foo@bar")).unwrap();
        fs::write(extensions.join("foo@bar").join("metadata.json"), "{}").unwrap();

        let archive = dir.path().join("out.tar.gz");
        archive_directory(&extensions, &archive).unwrap();

        let names = entries(&archive);
        assert!(names.contains(&"extensions/foo@bar/metadata.json".to_owned()));
    }

    #[test]
    fn missing_directory_gives_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("out.tar.gz");
        archive_directory(&dir.path().join("missing"), &archive).unwrap();
        assert!(entries(&archive).is_empty());
    }

    #[test]
    fn failed_dconf_export_keeps_previous_backup() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("backup");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join(EXTENSIONS_ARCHIVE_NAME), "previous archive").unwrap();
        fs::write(output.join(DCONF_DUMP_NAME), "previous dump").unwrap();

        let backup = Backup::new(dir.path().join("extensions"), &output)
            .with_dconf_program("/nonexistent/dconf-for-tests");
        let err = backup.run().unwrap_err();

        assert!(matches!(err, BackupError::Spawn { .. }));
        assert_eq!(
            fs::read_to_string(output.join(EXTENSIONS_ARCHIVE_NAME)).unwrap(),
            "previous archive"
        );
        assert_eq!(
            fs::read_to_string(output.join(DCONF_DUMP_NAME)).unwrap(),
            "previous dump"
        );
        let mut left: Vec<String> = fs::read_dir(&output)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec![EXTENSIONS_ARCHIVE_NAME, DCONF_DUMP_NAME]);
    }

    #[test]
    fn successful_backup_replaces_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("backup");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join(DCONF_DUMP_NAME), "previous dump").unwrap();

        // `true` exits 0 with no output, standing in for an empty dconf database.
        let backup = Backup::new(dir.path().join("extensions"), &output)
            .with_dconf_program("true");
        let result = backup.run().unwrap();

        assert_eq!(fs::read_to_string(&result.dconf_path).unwrap(), "");
        assert!(entries(&result.archive_path).is_empty());
        assert!(!staging_path(&result.dconf_path).exists());
    }
}
