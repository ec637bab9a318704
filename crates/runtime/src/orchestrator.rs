//! One reconciliation cycle, end to end.
//!
//! Phases run strictly in order:
//!
//! ```text
//! Scanning → Classifying → Archiving → Synthesizing → Normalizing → Committing → Persisting
//! ```
//!
//! When nothing changed since the watermark the cycle jumps from
//! classification straight to Persisting.  Every phase before Persisting is
//! soft-failing: problems are logged and folded into the [`CycleReport`].
//! The only error a cycle returns is an exhausted run-state write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use vaultsweep_agent::{
    SynthesisContext, SynthesisReport, SynthesisRequest, Synthesizer, build_user_prompt,
    synthesizer_from_config, system_prompt,
};
use vaultsweep_config::AppConfig;
use vaultsweep_exec::{ChangeCommitter, CommitSummary};
use vaultsweep_vault::{
    ArchivedRecord, Archiver, ChangeScanner, Classifier, ExclusionSet, MetadataNormalizer, Outcome,
    RetryPolicy, RunState, RunStateStore, StampReport, StateError,
};

use crate::schedule::parse_timezone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Scanning,
    Classifying,
    Archiving,
    Synthesizing,
    Normalizing,
    Committing,
    Persisting,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scanning => "scanning",
            Self::Classifying => "classifying",
            Self::Archiving => "archiving",
            Self::Synthesizing => "synthesizing",
            Self::Normalizing => "normalizing",
            Self::Committing => "committing",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Everything the orchestrator needs, injected at construction.
pub struct OrchestratorParts {
    pub vault_root: PathBuf,
    pub store: RunStateStore,
    pub scanner: ChangeScanner,
    pub classifier: Classifier,
    pub archiver: Archiver,
    pub normalizer: MetadataNormalizer,
    /// `None` disables the commit phase.
    pub committer: Option<ChangeCommitter>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub allowed_tools: Vec<String>,
    /// Zone the archive date key is computed in.
    pub timezone: Tz,
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cold_start: bool,
    pub date_key: String,
    pub scanned: usize,
    pub archived: Vec<ArchivedRecord>,
    pub archive_failures: usize,
    /// Relative paths of edited files handed to the collaborator.
    pub edited: Vec<String>,
    /// `None` when the cycle short-circuited.
    pub synthesis: Option<SynthesisReport>,
    pub stamp: StampReport,
    /// `None` when the cycle short-circuited or commits are disabled.
    pub commit: Option<Outcome<CommitSummary>>,
    pub persisted: RunState,
}

impl CycleReport {
    pub fn short_circuited(&self) -> bool {
        self.synthesis.is_none()
    }
}

pub struct CleanupOrchestrator {
    parts: OrchestratorParts,
}

impl CleanupOrchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self { parts }
    }

    /// Default wiring from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let vault = &config.vault;
        let vault_root = vault.root();

        // Bookkeeping paths must never feed back into a scan, even when
        // configured without a leading dot.
        let exclusions = ExclusionSet::new(vault.excluded_folders.iter().cloned().chain([
            vault.archive_folder.clone(),
            vault.state_file.clone(),
            vault.lock_file(),
        ]));
        let committer = config.git.enabled.then(|| {
            ChangeCommitter::from(&config.git)
                .excluding([vault.state_file.clone(), vault.lock_file()])
        });

        let parts = OrchestratorParts {
            store: RunStateStore::new(config.state_path(), RetryPolicy::from(&config.state)),
            scanner: ChangeScanner::new(exclusions.clone()),
            classifier: Classifier::new(vault.inbox_folder.clone(), exclusions),
            archiver: Archiver::new(vault_root.clone(), vault.archive_folder.clone()),
            normalizer: MetadataNormalizer::new(
                vault.timestamp_key.clone(),
                vault.stamp_extensions.clone(),
            ),
            committer,
            synthesizer: synthesizer_from_config(&config.synthesis),
            allowed_tools: config.synthesis.allowed_tools.clone(),
            timezone: parse_timezone(&config.schedule.timezone),
            vault_root,
        };
        Self::new(parts)
    }

    pub fn vault_root(&self) -> &Path {
        &self.parts.vault_root
    }

    pub fn store(&self) -> &RunStateStore {
        &self.parts.store
    }

    /// Cycle lock next to the state file, so every process pointed at this
    /// vault contends for the same file regardless of its working directory.
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.parts.store.path().as_os_str().to_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }

    pub fn scanner(&self) -> &ChangeScanner {
        &self.parts.scanner
    }

    pub fn classifier(&self) -> &Classifier {
        &self.parts.classifier
    }

    pub fn date_key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.parts.timezone)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Runs one cycle inside a span tagged with a fresh `cycle_id`.
    pub async fn run_cycle(&self) -> Result<CycleReport, StateError> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id);
        self.run_phases(cycle_id).instrument(span).await
    }

    async fn run_phases(&self, cycle_id: Uuid) -> Result<CycleReport, StateError> {
        let p = &self.parts;
        info!(vault = %p.vault_root.display(), "cleanup cycle started");

        enter(CyclePhase::Scanning);
        let watermark = p.store.get_last_run().await;
        let cold_start = watermark.is_none();
        let scanned = p.scanner.scan(&p.vault_root, watermark);
        let scanned_count = scanned.len();
        info!(files = scanned_count, cold_start, "scan complete");

        enter(CyclePhase::Classifying);
        let batch = p.classifier.partition(scanned, watermark);
        info!(new = batch.new.len(), edited = batch.edited.len(), "classification complete");

        let date_key = self.date_key(Utc::now());
        let edited: Vec<String> = batch.edited.iter().map(|f| f.relative_display()).collect();

        if batch.is_empty() {
            info!("nothing changed since last run, skipping to persist");
            enter(CyclePhase::Persisting);
            let persisted = p.store.update_last_run().await?;
            return Ok(CycleReport {
                cycle_id,
                cold_start,
                date_key,
                scanned: scanned_count,
                archived: Vec::new(),
                archive_failures: 0,
                edited,
                synthesis: None,
                stamp: StampReport::default(),
                commit: None,
                persisted,
            });
        }

        enter(CyclePhase::Archiving);
        let archive_report = p.archiver.archive_all(&batch.new, &date_key);
        let archived = archive_report.archived();
        let archive_failures = archive_report.failure_count();
        info!(archived = archived.len(), failed = archive_failures, date = %date_key, "archival complete");

        enter(CyclePhase::Synthesizing);
        let context = SynthesisContext {
            archived: archived.iter().map(|r| r.archive_path.clone()).collect(),
            edited: edited.clone(),
            archive_date: date_key.clone(),
            archive_folder: p.archiver.archive_folder().to_string(),
        };
        let request = SynthesisRequest {
            working_dir: p.vault_root.clone(),
            system_prompt: system_prompt().to_string(),
            user_prompt: build_user_prompt(&context),
            allowed_tools: p.allowed_tools.clone(),
        };
        let synthesis_started = Utc::now();
        let synthesis = p.synthesizer.synthesize(request).await;
        if !synthesis.is_success() {
            // No rollback: archived files stay archived and partial edits are kept.
            warn!(status = %synthesis.status, "synthesis did not succeed, continuing cycle");
        }

        enter(CyclePhase::Normalizing);
        let stamp = p.normalizer.stamp_touched(
            &p.scanner,
            &p.vault_root,
            synthesis_started,
            Utc::now(),
        );

        let commit = match &p.committer {
            Some(committer) => {
                enter(CyclePhase::Committing);
                let outcome = committer
                    .commit(&p.vault_root, &date_key, archived.len(), edited.len())
                    .await;
                info!(outcome = %outcome, "commit step finished");
                Some(outcome)
            }
            None => None,
        };

        enter(CyclePhase::Persisting);
        let persisted = p.store.update_last_run().await?;
        info!(
            archived = archived.len(),
            edited = edited.len(),
            stamped = stamp.stamped(),
            "cleanup cycle completed"
        );

        Ok(CycleReport {
            cycle_id,
            cold_start,
            date_key,
            scanned: scanned_count,
            archived,
            archive_failures,
            edited,
            synthesis: Some(synthesis),
            stamp,
            commit,
            persisted,
        })
    }
}

fn enter(phase: CyclePhase) {
    info!(%phase, "cycle phase");
}
