//! Change detection: every file modified after the watermark.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::exclusion::ExclusionSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Path relative to the vault root.
    pub relative_path: PathBuf,
    pub modified_at: DateTime<Utc>,
    /// Birth time, when the platform reports one.
    pub created_at: Option<DateTime<Utc>>,
}

impl ScannedFile {
    /// Relative path with `/` separators, as shown in prompts and logs.
    pub fn relative_display(&self) -> String {
        slash_path(&self.relative_path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeScanner {
    exclusions: ExclusionSet,
}

impl ChangeScanner {
    pub fn new(exclusions: ExclusionSet) -> Self {
        Self { exclusions }
    }

    /// Returns every regular file under `root` whose modification time is
    /// strictly after `since` (epoch zero when `None`).
    ///
    /// Comparison happens at millisecond precision, the precision of the
    /// persisted watermark.  Unreadable directories and files that cannot be
    /// stat'ed are logged and skipped.
    pub fn scan(&self, root: &Path, since: Option<DateTime<Utc>>) -> Vec<ScannedFile> {
        let since_ms = since.map(|ts| ts.timestamp_millis()).unwrap_or(0);
        match since {
            Some(ts) => info!(since = %ts.to_rfc3339(), root = %root.display(), "scanning for modified files"),
            None => info!(root = %root.display(), "scanning for modified files since the beginning of time"),
        }

        let exclusions = &self.exclusions;
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !exclusions.is_excluded_name(&entry.file_name().to_string_lossy())
            });

        let mut results = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                    warn!(%path, error = %err, "cannot read vault entry, skipping");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "cannot stat file, skipping");
                    continue;
                }
            };
            let modified_at = match metadata.modified() {
                Ok(time) => DateTime::<Utc>::from(time),
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "no modification time, skipping");
                    continue;
                }
            };
            if modified_at.timestamp_millis() <= since_ms {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            debug!(path = %relative.display(), "modified");
            results.push(ScannedFile {
                path: entry.path().to_path_buf(),
                relative_path: relative.to_path_buf(),
                modified_at,
                created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            });
        }

        info!(count = results.len(), "found modified files");
        results
    }
}

pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
