//! Single-session advisory lock
//!
//! Two concurrent flashing sessions on the same host would fight over the
//! Klipper service and the serial devices, so the session takes an advisory
//! lock file under the printer data directory. The file holds the owning
//! PID for post-mortem inspection and is removed on drop.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{FlashError, Result};

/// Held for the lifetime of a session; dropping releases the lock
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => FlashError::SessionLocked {
                    lock_path: path.display().to_string(),
                },
                _ => FlashError::IoError {
                    message: e.to_string(),
                },
            })?;
        let _ = writeln!(file, "{}", std::process::id());
        tracing::debug!(path = %path.display(), "session lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}
