//! New vs. edited classification.

use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::exclusion::ExclusionSet;
use crate::scanner::ScannedFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Edited,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifiedBatch {
    pub new: Vec<ScannedFile>,
    pub edited: Vec<ScannedFile>,
}

impl ClassifiedBatch {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.edited.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    inbox_folder: String,
    exclusions: ExclusionSet,
}

impl Classifier {
    pub fn new(inbox_folder: impl Into<String>, exclusions: ExclusionSet) -> Self {
        Self {
            inbox_folder: inbox_folder.into(),
            exclusions,
        }
    }

    /// Warm start: new iff born strictly after the watermark.  A file whose
    /// birth time the platform cannot report is treated as edited.
    ///
    /// Cold start: there is no "recently touched" baseline, so placement
    /// decides.  Files directly under the vault root or in the inbox folder
    /// are new; everything else is considered already organised.
    pub fn classify(&self, file: &ScannedFile, watermark: Option<DateTime<Utc>>) -> Classification {
        match watermark {
            Some(watermark) => match file.created_at {
                Some(created) if created > watermark => Classification::New,
                _ => Classification::Edited,
            },
            None => {
                if is_triage_location(&file.relative_path, &self.inbox_folder) {
                    Classification::New
                } else {
                    Classification::Edited
                }
            }
        }
    }

    /// Splits a scan into new and edited files, dropping anything that
    /// lives under an excluded folder.
    pub fn partition(&self, files: Vec<ScannedFile>, watermark: Option<DateTime<Utc>>) -> ClassifiedBatch {
        let mut batch = ClassifiedBatch::default();
        for file in files {
            if self.exclusions.excludes(&file.relative_path) {
                debug!(path = %file.relative_display(), "excluded folder, dropping");
                continue;
            }
            match self.classify(&file, watermark) {
                Classification::New => batch.new.push(file),
                Classification::Edited => batch.edited.push(file),
            }
        }
        batch
    }
}

fn is_triage_location(relative: &Path, inbox_folder: &str) -> bool {
    let segments: Vec<_> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect();
    match segments.as_slice() {
        [_] => true,
        [first, ..] => first.to_string_lossy() == inbox_folder,
        [] => false,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{Duration, Utc};

    use super::{Classification, Classifier};
    use crate::exclusion::ExclusionSet;
    use crate::scanner::ScannedFile;

    fn file(rel: &str, created_offset_secs: Option<i64>) -> ScannedFile {
        let now = Utc::now();
        ScannedFile {
            path: PathBuf::from("/vault").join(rel),
            relative_path: PathBuf::from(rel),
            modified_at: now,
            created_at: created_offset_secs.map(|secs| now + Duration::seconds(secs)),
        }
    }

    fn classifier() -> Classifier {
        Classifier::new("Inbox", ExclusionSet::new(["Templates"]))
    }

    #[test]
    fn cold_start_uses_placement() {
        let c = classifier();
        assert_eq!(c.classify(&file("Inbox/note.md", None), None), Classification::New);
        assert_eq!(c.classify(&file("note.md", None), None), Classification::New);
        assert_eq!(
            c.classify(&file("Work/Projects/plan.md", None), None),
            Classification::Edited
        );
        assert_eq!(
            c.classify(&file("Inbox/Deep/nested.md", None), None),
            Classification::New
        );
        assert_eq!(c.classify(&file("Inboxes/x.md", None), None), Classification::Edited);
    }

    #[test]
    fn warm_start_uses_creation_time() {
        let c = classifier();
        let watermark = Utc::now();
        let created_after = file("Work/plan.md", Some(60));
        let created_before = file("Inbox/note.md", Some(-3600));
        assert_eq!(c.classify(&created_after, Some(watermark)), Classification::New);
        // Placement is irrelevant on a warm start.
        assert_eq!(c.classify(&created_before, Some(watermark)), Classification::Edited);
    }

    #[test]
    fn warm_start_creation_equal_to_watermark_is_edited() {
        let c = classifier();
        let mut f = file("note.md", None);
        let watermark = Utc::now();
        f.created_at = Some(watermark);
        assert_eq!(c.classify(&f, Some(watermark)), Classification::Edited);
    }

    #[test]
    fn warm_start_without_birth_time_is_edited() {
        let c = classifier();
        assert_eq!(
            c.classify(&file("note.md", None), Some(Utc::now())),
            Classification::Edited
        );
    }

    #[test]
    fn partition_splits_and_drops_excluded() {
        let c = classifier();
        let batch = c.partition(
            vec![
                file("note.md", None),
                file("Inbox/idea.md", None),
                file("Work/plan.md", None),
                file("Templates/daily.md", None),
            ],
            None,
        );
        let new: Vec<_> = batch.new.iter().map(|f| f.relative_display()).collect();
        let edited: Vec<_> = batch.edited.iter().map(|f| f.relative_display()).collect();
        assert_eq!(new, vec!["note.md", "Inbox/idea.md"]);
        assert_eq!(edited, vec!["Work/plan.md"]);
        assert!(!batch.is_empty());
    }
}
