//! Persisted watermark of the last completed cycle.
//!
//! One small JSON record at a fixed path in the vault root.  Every update
//! replaces the file wholesale through a temp file + rename, so a concurrent
//! reader sees either the old record or the new one, never a torn write.
//! Both directions retry with exponential backoff; reads degrade to "no
//! previous run" while writes escalate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use vaultsweep_config::StateConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Epoch milliseconds.
    pub last_run_timestamp: i64,
    /// RFC 3339 rendering of the same instant.
    pub last_run_date: String,
}

impl RunState {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            last_run_timestamp: now.timestamp_millis(),
            last_run_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_run_timestamp)
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write run state {path} after {attempts} attempts: {source}")]
    WriteExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StateConfig::default())
    }
}

impl From<&StateConfig> for RetryPolicy {
    fn from(config: &StateConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
    retry: RetryPolicy,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Watermark of the last completed cycle, or `None` for a first run.
    ///
    /// Never fails: a missing file is a first run, and a file that stays
    /// unreadable through every retry is treated as one too.  A spurious full
    /// rescan is slower but safe.
    pub async fn get_last_run(&self) -> Option<DateTime<Utc>> {
        self.load().await.and_then(|state| state.last_run())
    }

    /// Full persisted record, with the same degradation as [`get_last_run`].
    ///
    /// [`get_last_run`]: Self::get_last_run
    pub async fn load(&self) -> Option<RunState> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            info!(path = %self.path.display(), "no previous run found, this is the first run");
            return None;
        }

        let mut last_error = None;
        for attempt in 0..self.retry.max_attempts {
            match self.read_once().await {
                Ok(state) => return Some(state),
                Err(err) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "failed to read run state"
                    );
                    last_error = Some(err);
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(
            attempts = self.retry.max_attempts,
            error = ?last_error,
            "failed to read run state, treating as first run"
        );
        None
    }

    /// Records now as the last completed cycle.
    pub async fn update_last_run(&self) -> Result<RunState, StateError> {
        self.update_last_run_at(Utc::now()).await
    }

    /// Records `now` as the last completed cycle.  Exhausting every retry is
    /// the one failure a cycle surfaces to its caller.
    pub async fn update_last_run_at(&self, now: DateTime<Utc>) -> Result<RunState, StateError> {
        let state = RunState::at(now);

        let mut last_error = None;
        for attempt in 0..self.retry.max_attempts {
            match self.write_once(&state).await {
                Ok(()) => {
                    info!(last_run = %state.last_run_date, "run state updated");
                    return Ok(state);
                }
                Err(err) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "failed to write run state"
                    );
                    last_error = Some(err);
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(StateError::WriteExhausted {
            path: self.path.clone(),
            attempts: self.retry.max_attempts,
            source: last_error.unwrap_or_else(|| anyhow::anyhow!("no write attempted")),
        })
    }

    async fn read_once(&self) -> anyhow::Result<RunState> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes to a per-process `.tmp` sibling, fsyncs, then renames over the
    /// target.  The temp file is removed on any error path.
    async fn write_once(&self, state: &RunState) -> anyhow::Result<()> {
        let tmp_path = self.tmp_path();
        let rendered = serde_json::to_string_pretty(state)?;

        let write_result: anyhow::Result<()> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            file.write_all(rendered.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let filename = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "state.json".to_string());
        self.path
            .with_file_name(format!("{filename}.{}.tmp", std::process::id()))
    }
}
