//! Relocation of new files into the dated archive subtree.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::outcome::Outcome;
use crate::scanner::{ScannedFile, slash_path};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive destination already exists: {0}")]
    Collision(PathBuf),

    #[error("failed to archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedRecord {
    /// Original path relative to the vault root.
    pub source: PathBuf,
    /// Destination relative to the vault root, `/`-separated:
    /// `<archive folder>/<date key>/<original relative path>`.
    pub archive_path: String,
}

/// Per-file results of one archival pass, in input order.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub items: Vec<(PathBuf, Outcome<ArchivedRecord>)>,
}

impl ArchiveReport {
    pub fn archived(&self) -> Vec<ArchivedRecord> {
        self.items
            .iter()
            .filter_map(|(_, outcome)| outcome.as_success().cloned())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &str)> {
        self.items
            .iter()
            .filter_map(|(path, outcome)| outcome.reason().map(|reason| (path, reason)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

#[derive(Debug, Clone)]
pub struct Archiver {
    vault_root: PathBuf,
    archive_folder: String,
}

impl Archiver {
    pub fn new(vault_root: impl Into<PathBuf>, archive_folder: impl Into<String>) -> Self {
        Self {
            vault_root: vault_root.into(),
            archive_folder: archive_folder.into(),
        }
    }

    pub fn archive_folder(&self) -> &str {
        &self.archive_folder
    }

    pub fn archive_root(&self) -> PathBuf {
        self.vault_root.join(&self.archive_folder)
    }

    /// Moves `file` to `<vault>/<archive folder>/<date_key>/<relative path>`.
    ///
    /// Never overwrites: an existing destination is a
    /// [`ArchiveError::Collision`] and the source stays where it was.
    pub fn archive(&self, file: &ScannedFile, date_key: &str) -> Result<ArchivedRecord, ArchiveError> {
        let destination = self
            .archive_root()
            .join(date_key)
            .join(&file.relative_path);

        if destination.exists() {
            return Err(ArchiveError::Collision(destination));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        move_file(&file.path, &destination).map_err(|source| ArchiveError::Io {
            path: file.path.clone(),
            source,
        })?;

        let archive_path = format!(
            "{}/{}/{}",
            self.archive_folder,
            date_key,
            slash_path(&file.relative_path)
        );
        info!(from = %file.relative_display(), to = %archive_path, "archived");
        Ok(ArchivedRecord {
            source: file.relative_path.clone(),
            archive_path,
        })
    }

    /// Archives every file independently; one failure never blocks the rest.
    pub fn archive_all(&self, files: &[ScannedFile], date_key: &str) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        for file in files {
            let outcome = match self.archive(file, date_key) {
                Ok(record) => Outcome::Success(record),
                Err(err) => {
                    warn!(path = %file.relative_display(), error = %err, "archive failed, skipping");
                    Outcome::failed(err.to_string())
                }
            };
            report.items.push((file.relative_path.clone(), outcome));
        }
        report
    }
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Utc;
    use tempfile::TempDir;

    use super::{ArchiveError, Archiver};
    use crate::scanner::ScannedFile;
    use crate::scanner::tests::write_file;

    fn scanned(root: &std::path::Path, rel: &str) -> ScannedFile {
        ScannedFile {
            path: root.join(rel),
            relative_path: rel.into(),
            modified_at: Utc::now(),
            created_at: None,
        }
    }

    #[test]
    fn archive_moves_file_under_dated_folder() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "Inbox/note.md", "hello");
        let archiver = Archiver::new(dir.path(), ".archive");

        let record = archiver
            .archive(&scanned(dir.path(), "Inbox/note.md"), "2025-03-01")
            .unwrap();

        assert_eq!(record.archive_path, ".archive/2025-03-01/Inbox/note.md");
        assert!(!dir.path().join("Inbox/note.md").exists());
        let moved = dir.path().join(".archive/2025-03-01/Inbox/note.md");
        assert_eq!(fs::read_to_string(moved).unwrap(), "hello");
    }

    #[test]
    fn second_archive_of_same_path_collides() {
        let dir = TempDir::new().unwrap();
        let archiver = Archiver::new(dir.path(), ".archive");

        write_file(dir.path(), "note.md", "first");
        archiver.archive(&scanned(dir.path(), "note.md"), "2025-03-01").unwrap();

        write_file(dir.path(), "note.md", "second");
        let err = archiver
            .archive(&scanned(dir.path(), "note.md"), "2025-03-01")
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Collision(_)));
        // Neither side was clobbered.
        assert_eq!(fs::read_to_string(dir.path().join("note.md")).unwrap(), "second");
        assert_eq!(
            fs::read_to_string(dir.path().join(".archive/2025-03-01/note.md")).unwrap(),
            "first"
        );
    }

    #[test]
    fn archive_all_isolates_failures() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.md", "a");
        write_file(dir.path(), "b.md", "b");
        let archiver = Archiver::new(dir.path(), ".archive");

        let files = vec![
            scanned(dir.path(), "a.md"),
            scanned(dir.path(), "vanished.md"),
            scanned(dir.path(), "b.md"),
        ];
        let report = archiver.archive_all(&files, "2025-03-02");

        let archived: Vec<_> = report
            .archived()
            .into_iter()
            .map(|r| r.archive_path)
            .collect();
        assert_eq!(archived, vec![".archive/2025-03-02/a.md", ".archive/2025-03-02/b.md"]);
        assert_eq!(report.failure_count(), 1);
        let (path, _) = report.failures().next().unwrap();
        assert_eq!(path, &std::path::PathBuf::from("vanished.md"));
        assert!(report.items[1].1.is_failed());
    }
}
