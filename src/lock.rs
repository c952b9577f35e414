//! File-based locking so that only one daemon writes to a store at a time.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// Holds an exclusive advisory lock; released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the lock without blocking.
    ///
    /// The file is opened with create+read+write and never truncated, so
    /// there is no window between creating it and locking it.
    pub fn acquire(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            // /var/run normally exists already
            fs::create_dir_all(parent).ok();
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                SyncError::Lock(format!("Failed to open lock file {}: {}", path.display(), e))
            })?;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            SyncError::Lock(format!("Failed to set lock file permissions: {}", e))
        })?;

        file.try_lock_exclusive().map_err(|_| {
            SyncError::Lock(format!(
                "Another instance of intelsync is already running.\n\
                 If you believe this is an error, remove the lock file: {}",
                path.display()
            ))
        })?;

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
