use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use tracing::debug;

/// Process-level guard that keeps two cycles from running against the same
/// vault.  The OS lock is released when the guard drops.
#[derive(Debug)]
pub struct CycleLock {
    _file: File,
    path: PathBuf,
}

impl CycleLock {
    /// Takes the lock at `path` without waiting.  Fails fast when another
    /// process or trigger already holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create lock dir {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            bail!(
                "another cleanup cycle is already running (lock held at {})",
                path.display()
            );
        }
        debug!(lock = %path.display(), "cycle lock acquired");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
