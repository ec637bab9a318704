//! Vault-side building blocks of a cleanup cycle: change detection,
//! new/edited classification, dated archival, header stamping and the
//! persisted run watermark.

pub mod archiver;
pub mod classifier;
pub mod exclusion;
pub mod frontmatter;
pub mod outcome;
pub mod scanner;
pub mod state;

pub use archiver::{ArchiveError, ArchiveReport, ArchivedRecord, Archiver};
pub use classifier::{Classification, ClassifiedBatch, Classifier};
pub use exclusion::ExclusionSet;
pub use frontmatter::{HeaderEdit, MetadataNormalizer, StampReport, stamp_content};
pub use outcome::Outcome;
pub use scanner::{ChangeScanner, ScannedFile};
pub use state::{RetryPolicy, RunState, RunStateStore, StateError};
