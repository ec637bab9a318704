//! External process plumbing for the cleanup cycle.

pub mod git;

pub use git::{ChangeCommitter, CommitSummary};
