//! Backup and write-back of patched files.
//!
//! Every write goes through [`atomic_write`] (tempfile + fsync + rename), so
//! an interrupted run leaves either the old or the new file, never a mix.
//! Backups are created once and never overwritten.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const BACKUP_SUFFIX: &str = ".backup";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup file not found: {0}")]
    Missing(PathBuf),

    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BackupError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> BackupError + '_ {
        move |source| BackupError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of [`ensure_backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "BackupStatus reports whether a new backup was written"]
pub enum BackupStatus {
    Created(PathBuf),
    /// An earlier backup was found and left untouched
    AlreadyExists(PathBuf),
}

impl BackupStatus {
    pub fn path(&self) -> &Path {
        match self {
            BackupStatus::Created(path) | BackupStatus::AlreadyExists(path) => path,
        }
    }
}

/// Outcome of [`restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreStatus {
    pub backup: PathBuf,
    pub bytes: usize,
    pub backup_removed: bool,
}

/// `HUNDRED_LINE.exe` -> `HUNDRED_LINE.exe.backup`, in the same directory.
pub fn backup_path(path: &Path) -> Result<PathBuf, BackupError> {
    let name = path
        .file_name()
        .ok_or_else(|| BackupError::NoFileName(path.to_path_buf()))?;
    let mut backup_name = OsString::from(name);
    backup_name.push(BACKUP_SUFFIX);
    Ok(path.with_file_name(backup_name))
}

/// Copy `path` to its backup location unless a backup already exists.
///
/// The copy keeps the original modification time.
pub fn ensure_backup(path: &Path) -> Result<BackupStatus, BackupError> {
    let backup = backup_path(path)?;

    if backup.exists() {
        info!("backup already exists: {}", backup.display());
        return Ok(BackupStatus::AlreadyExists(backup));
    }

    let content = fs::read(path).map_err(BackupError::io(path))?;
    atomic_write(&backup, &content)?;

    let metadata = fs::metadata(path).map_err(BackupError::io(path))?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(&backup, mtime).map_err(BackupError::io(&backup))?;

    info!("created backup: {}", backup.display());
    Ok(BackupStatus::Created(backup))
}

/// Put the backup content back in place of `path`.
///
/// The backup is removed afterwards unless `keep_backup` is set.
pub fn restore(path: &Path, keep_backup: bool) -> Result<RestoreStatus, BackupError> {
    let backup = backup_path(path)?;
    if !backup.exists() {
        return Err(BackupError::Missing(backup));
    }

    let content = fs::read(&backup).map_err(BackupError::io(&backup))?;
    atomic_write(path, &content)?;
    info!("restored {} from {}", path.display(), backup.display());

    let backup_removed = if keep_backup {
        false
    } else {
        fs::remove_file(&backup).map_err(BackupError::io(&backup))?;
        true
    };

    Ok(RestoreStatus {
        backup,
        bytes: content.len(),
        backup_removed,
    })
}

/// Atomic file write: tempfile + fsync + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), BackupError> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(BackupError::io(parent))?;
    temp.write_all(content).map_err(BackupError::io(path))?;
    temp.as_file().sync_all().map_err(BackupError::io(path))?;
    temp.persist(path).map_err(|e| BackupError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}
