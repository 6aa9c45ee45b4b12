//! Backup Store
//!
//! Byte-identical sibling copies of config files, taken before the first
//! mutation of a file within one operation. Later touches in the same
//! operation reuse the first backup so it always holds pre-operation state.
//!
//! The backup path is the same for every operation. A backup that a
//! journal entry still points at is never copied over: a later operation
//! touching the same file shares it, so it keeps the state from before the
//! oldest unreverted operation.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Suffix appended to the original path to form the backup path
pub const DEFAULT_BACKUP_SUFFIX: &str = ".autotweak.bak";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("cannot back up {} to {}: {source}", path.display(), backup.display())]
    Copy {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backup {} no longer exists", backup.display())]
    Missing { backup: PathBuf },

    #[error("cannot restore {} from {}: {source}", path.display(), backup.display())]
    Restore {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Deterministic sibling backup path: the original path plus `suffix`
pub fn backup_path_for(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Per-operation backup registry
#[derive(Debug, Clone)]
pub struct BackupStore {
    suffix: String,
    taken: BTreeMap<PathBuf, PathBuf>,
    /// Backups still referenced by the journal
    held: BTreeSet<PathBuf>,
}

impl Default for BackupStore {
    fn default() -> Self {
        Self::new(DEFAULT_BACKUP_SUFFIX)
    }
}

impl BackupStore {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            taken: BTreeMap::new(),
            held: BTreeSet::new(),
        }
    }

    /// Never overwrite any of `backups`; reuse them when they exist
    pub fn holding<I>(mut self, backups: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.held.extend(backups);
        self
    }

    /// Back up `path` unless this operation already did
    ///
    /// Returns `None` when the file does not exist.
    pub fn ensure_backup(&mut self, path: &Path) -> Result<Option<PathBuf>, BackupError> {
        if let Some(existing) = self.taken.get(path) {
            debug!("Backup of {} already taken this operation", path.display());
            return Ok(Some(existing.clone()));
        }

        if !path.exists() {
            return Ok(None);
        }

        let backup = backup_path_for(path, &self.suffix);
        if self.held.contains(&backup) && backup.exists() {
            info!("Reusing backup {} held by an earlier operation", backup.display());
        } else {
            fs::copy(path, &backup).map_err(|source| BackupError::Copy {
                path: path.to_path_buf(),
                backup: backup.clone(),
                source,
            })?;
            info!("Backup created: {}", backup.display());
        }

        self.taken.insert(path.to_path_buf(), backup.clone());
        Ok(Some(backup))
    }

}

/// Copy `backup` back over `target`
pub fn restore_backup(backup: &Path, target: &Path) -> Result<(), BackupError> {
    if !backup.exists() {
        return Err(BackupError::Missing {
            backup: backup.to_path_buf(),
        });
    }

    fs::copy(backup, target).map_err(|source| BackupError::Restore {
        path: target.to_path_buf(),
        backup: backup.to_path_buf(),
        source,
    })?;
    info!("Restored {} from {}", target.display(), backup.display());
    Ok(())
}
