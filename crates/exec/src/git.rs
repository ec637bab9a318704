//! Version-control snapshot of the vault after a cycle.
//!
//! Everything here is best-effort: git missing, the vault not being a
//! working tree, nothing to commit, or any git command failing yields an
//! [`Outcome`] rather than an error.  A commit problem must never stop the
//! caller from persisting the run state afterwards.
//!
//! # Commit sequence
//!
//! 1. `git rev-parse --is-inside-work-tree`: skip unless it prints `true`.
//! 2. `git status --porcelain`: skip when the tree is clean.
//! 3. `git add -A`, then one `git commit --no-verify` with a message that
//!    encodes the archive date and the archived/edited counts.
//! 4. Optionally `git push`.  No remote is a normal condition.
//!
//! Status and add are limited to the vault directory, minus the excluded
//! paths (the run state and the cycle lock), so bookkeeping files are never
//! committed and a state-only change counts as a clean tree.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Output;

use tracing::{debug, info, warn};

use vaultsweep_config::GitConfig;
use vaultsweep_vault::Outcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub message: String,
    pub pushed: bool,
}

#[derive(Debug, Clone)]
pub struct ChangeCommitter {
    author_name: String,
    author_email: String,
    push: bool,
    excluded: Vec<String>,
}

impl Default for ChangeCommitter {
    fn default() -> Self {
        Self::from(&GitConfig::default())
    }
}

impl From<&GitConfig> for ChangeCommitter {
    fn from(config: &GitConfig) -> Self {
        Self {
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            push: config.push,
            excluded: Vec::new(),
        }
    }
}

enum GitRun {
    Ok(String),
    Failed(String),
    NotInstalled,
}

impl ChangeCommitter {
    pub fn new(author_name: impl Into<String>, author_email: impl Into<String>, push: bool) -> Self {
        Self {
            author_name: author_name.into(),
            author_email: author_email.into(),
            push,
            excluded: Vec::new(),
        }
    }

    /// Paths, relative to the vault root, left out of status and staging.
    pub fn excluding<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn commit_message(date_key: &str, archived: usize, edited: usize) -> String {
        format!("vaultsweep: {date_key} cleanup ({archived} archived, {edited} edited)")
    }

    pub async fn commit(
        &self,
        vault_root: &Path,
        date_key: &str,
        archived: usize,
        edited: usize,
    ) -> Outcome<CommitSummary> {
        match self.run(vault_root, &["rev-parse", "--is-inside-work-tree"]).await {
            GitRun::Ok(out) if out.trim() == "true" => {}
            GitRun::NotInstalled => return Outcome::skipped("git is not installed"),
            _ => {
                debug!(vault = %vault_root.display(), "not a git working tree, skipping commit");
                return Outcome::skipped("vault is not a git working tree");
            }
        }

        let excludes: Vec<String> = self
            .excluded
            .iter()
            .map(|p| format!(":(exclude){p}"))
            .collect();

        let status = with_pathspec(&["status", "--porcelain"], &excludes);
        match self.run(vault_root, &status).await {
            GitRun::Ok(out) if out.trim().is_empty() => {
                info!("no pending vault changes, skipping commit");
                return Outcome::skipped("no changes to commit");
            }
            GitRun::Ok(_) => {}
            GitRun::Failed(stderr) => return self.fail("git status", stderr),
            GitRun::NotInstalled => return Outcome::skipped("git is not installed"),
        }

        let add = with_pathspec(&["add", "-A"], &excludes);
        if let GitRun::Failed(stderr) = self.run(vault_root, &add).await {
            return self.fail("git add -A", stderr);
        }

        let message = Self::commit_message(date_key, archived, edited);
        match self
            .run(vault_root, &["commit", "--no-verify", "-m", &message])
            .await
        {
            GitRun::Ok(_) => info!(commit_msg = %message, "committed vault changes"),
            GitRun::Failed(stderr) => return self.fail("git commit", stderr),
            GitRun::NotInstalled => return Outcome::skipped("git is not installed"),
        }

        let pushed = self.push && self.try_push(vault_root).await;
        Outcome::Success(CommitSummary { message, pushed })
    }

    async fn try_push(&self, vault_root: &Path) -> bool {
        match self.run(vault_root, &["push"]).await {
            GitRun::Ok(_) => {
                info!("pushed vault commit");
                true
            }
            GitRun::Failed(stderr) => {
                info!(%stderr, "git push did not succeed (no remote is normal)");
                false
            }
            GitRun::NotInstalled => false,
        }
    }

    fn fail(&self, step: &str, stderr: String) -> Outcome<CommitSummary> {
        warn!(%stderr, "{step} failed (non-fatal)");
        Outcome::failed(format!("{step} failed: {stderr}"))
    }

    async fn run(&self, vault_root: &Path, args: &[&str]) -> GitRun {
        let out: std::io::Result<Output> = tokio::process::Command::new("git")
            .args(args)
            .env("GIT_AUTHOR_NAME", &self.author_name)
            .env("GIT_AUTHOR_EMAIL", &self.author_email)
            .env("GIT_COMMITTER_NAME", &self.author_name)
            .env("GIT_COMMITTER_EMAIL", &self.author_email)
            .env("GIT_TERMINAL_PROMPT", "0")
            .current_dir(vault_root)
            .output()
            .await;

        match out {
            Ok(o) if o.status.success() => GitRun::Ok(String::from_utf8_lossy(&o.stdout).to_string()),
            Ok(o) => GitRun::Failed(String::from_utf8_lossy(&o.stderr).trim().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => GitRun::NotInstalled,
            Err(e) => GitRun::Failed(e.to_string()),
        }
    }
}

/// `base -- . :(exclude)...`, scoping a command to the vault directory.
fn with_pathspec<'a>(base: &[&'a str], excludes: &'a [String]) -> Vec<&'a str> {
    let mut args = base.to_vec();
    args.extend(["--", "."]);
    args.extend(excludes.iter().map(String::as_str));
    args
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::process::Command;

    use tempfile::TempDir;

    use super::ChangeCommitter;
    use vaultsweep_vault::Outcome;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@localhost")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@localhost")
            .output()
            .unwrap();
        String::from_utf8_lossy(&out.stdout).to_string()
    }

    fn committer() -> ChangeCommitter {
        ChangeCommitter::new("Vaultsweep", "vaultsweep@localhost", true)
    }

    #[test]
    fn message_encodes_date_and_counts() {
        assert_eq!(
            ChangeCommitter::commit_message("2025-03-01", 3, 2),
            "vaultsweep: 2025-03-01 cleanup (3 archived, 2 edited)"
        );
    }

    #[tokio::test]
    async fn non_repository_is_skipped() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.md"), "x").unwrap();
        let outcome = committer().commit(dir.path(), "2025-03-01", 1, 0).await;
        assert!(matches!(outcome, Outcome::Skipped(_)));
    }

    #[tokio::test]
    async fn commits_pending_changes_then_skips_clean_tree() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("note.md"), "hello").unwrap();

        let outcome = committer().commit(dir.path(), "2025-03-01", 1, 2).await;
        let Outcome::Success(summary) = outcome else {
            panic!("expected a commit, got {outcome:?}");
        };
        assert_eq!(summary.message, "vaultsweep: 2025-03-01 cleanup (1 archived, 2 edited)");
        // No remote configured.
        assert!(!summary.pushed);

        let log = git(dir.path(), &["log", "--format=%s %an"]);
        assert_eq!(log.trim(), "vaultsweep: 2025-03-01 cleanup (1 archived, 2 edited) Vaultsweep");

        let again = committer().commit(dir.path(), "2025-03-01", 0, 0).await;
        assert_eq!(again, Outcome::Skipped("no changes to commit".to_string()));
    }

    #[tokio::test]
    async fn excluded_state_file_is_never_committed() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("note.md"), "hello").unwrap();
        fs::write(dir.path().join(".state.json"), "{}").unwrap();
        fs::write(dir.path().join(".state.json.lock"), "").unwrap();

        let committer = committer().excluding([".state.json", ".state.json.lock"]);
        let outcome = committer.commit(dir.path(), "2025-03-01", 0, 1).await;
        assert!(matches!(outcome, Outcome::Success(_)), "{outcome:?}");

        let tracked = git(dir.path(), &["ls-files"]);
        assert_eq!(tracked.trim(), "note.md");

        // Rewriting only the state file leaves nothing to commit.
        fs::write(dir.path().join(".state.json"), r#"{"last_run":1}"#).unwrap();
        let again = committer.commit(dir.path(), "2025-03-02", 0, 0).await;
        assert_eq!(again, Outcome::Skipped("no changes to commit".to_string()));
    }

    #[tokio::test]
    async fn push_disabled_never_pushes() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("a.md"), "a").unwrap();

        let quiet = ChangeCommitter::new("Vaultsweep", "vaultsweep@localhost", false);
        let outcome = quiet.commit(dir.path(), "2025-03-02", 0, 1).await;
        assert_eq!(outcome.success().map(|s| s.pushed), Some(false));
    }
}
