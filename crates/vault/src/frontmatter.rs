//! Front-matter timestamp stamping.
//!
//! A header block is an opening `---` line, raw `key: value` lines, and a
//! closing `---` line.  Stamping touches only the timestamp line; every other
//! header line and the whole body are preserved byte-for-byte.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::outcome::Outcome;
use crate::scanner::ChangeScanner;

const MARKER: &str = "---";

/// Result of rewriting one file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEdit {
    /// No header was present; a minimal one was prepended.
    Prepended(String),
    /// The existing header was rewritten.
    Updated(String),
    /// Opening marker without a closing marker.  Left untouched.
    Malformed,
}

/// Stamps `key: value` into the header of `content`.
pub fn stamp_content(content: &str, key: &str, value: &str) -> HeaderEdit {
    let mut lines = content.split_inclusive('\n');
    let opening = match lines.next() {
        Some(line) if strip_eol(line) == MARKER => line,
        _ => return HeaderEdit::Prepended(format!("{MARKER}\n{key}: {value}\n{MARKER}\n\n{content}")),
    };
    let eol = if opening.ends_with("\r\n") { "\r\n" } else { "\n" };

    let mut header = Vec::new();
    let mut offset = opening.len();
    let mut closing_at = None;
    for line in lines {
        if strip_eol(line) == MARKER {
            closing_at = Some(offset);
            break;
        }
        header.push(line);
        offset += line.len();
    }
    let Some(closing_at) = closing_at else {
        return HeaderEdit::Malformed;
    };

    let prefix = format!("{key}:");
    let stamped = format!("{key}: {value}");
    let mut out = String::with_capacity(content.len() + stamped.len() + 2);
    out.push_str(opening);

    let mut replaced = false;
    for line in header {
        if !replaced && line.starts_with(&prefix) {
            out.push_str(&stamped);
            out.push_str(line_ending(line));
            replaced = true;
        } else {
            out.push_str(line);
        }
    }
    if !replaced {
        out.push_str(&stamped);
        out.push_str(eol);
    }
    out.push_str(&content[closing_at..]);
    HeaderEdit::Updated(out)
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn line_ending(line: &str) -> &str {
    &line[strip_eol(line).len()..]
}

/// Per-file results of one stamping pass.
#[derive(Debug, Default)]
pub struct StampReport {
    pub items: Vec<(PathBuf, Outcome<()>)>,
}

impl StampReport {
    pub fn stamped(&self) -> usize {
        self.items.iter().filter(|(_, outcome)| outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|(_, outcome)| outcome.is_failed()).count()
    }
}

#[derive(Debug, Clone)]
pub struct MetadataNormalizer {
    key: String,
    extensions: Vec<String>,
}

impl MetadataNormalizer {
    pub fn new(key: impl Into<String>, extensions: Vec<String>) -> Self {
        Self {
            key: key.into(),
            extensions,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().map(|ext| ext.to_string_lossy()) else {
            return false;
        };
        self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    }

    /// Stamps `timestamp` into the header of the file at `path`.
    pub fn stamp(&self, path: &Path, timestamp: DateTime<Utc>) -> Outcome<()> {
        if !self.accepts(path) {
            return Outcome::skipped("not a stampable file type");
        }
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => return Outcome::failed(format!("read failed: {err}")),
        };
        let Ok(content) = String::from_utf8(bytes) else {
            return Outcome::skipped("not valid UTF-8 text");
        };

        let value = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let rewritten = match stamp_content(&content, &self.key, &value) {
            HeaderEdit::Prepended(text) | HeaderEdit::Updated(text) => text,
            HeaderEdit::Malformed => {
                warn!(path = %path.display(), "unterminated header block, leaving file untouched");
                return Outcome::skipped("malformed header");
            }
        };
        match write_atomically(path, rewritten.as_bytes()) {
            Ok(()) => {
                debug!(path = %path.display(), key = %self.key, "stamped");
                Outcome::Success(())
            }
            Err(err) => Outcome::failed(format!("write failed: {err}")),
        }
    }

    /// Stamps every file under `root` modified after `since`, i.e. the files
    /// the synthesis step actually touched.
    pub fn stamp_touched(
        &self,
        scanner: &ChangeScanner,
        root: &Path,
        since: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    ) -> StampReport {
        let mut report = StampReport::default();
        for file in scanner.scan(root, Some(since)) {
            let outcome = self.stamp(&file.path, timestamp);
            if let Outcome::Failed(reason) = &outcome {
                warn!(path = %file.relative_display(), %reason, "stamp failed, skipping");
            }
            report.items.push((file.relative_path, outcome));
        }
        info!(
            stamped = report.stamped(),
            failed = report.failed(),
            "header normalisation complete"
        );
        report
    }
}

/// Replaces `path` through a hidden temp sibling that is fsynced, given the
/// original permissions and renamed over it.  The temp file is removed on
/// any error, so a failed stamp leaves the old note intact.
fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp_path, meta.permissions())?;
        }
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
