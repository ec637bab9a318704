use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use vaultsweep_config::AppConfig;

use crate::lock::CycleLock;
use crate::orchestrator::{CleanupOrchestrator, CycleReport};
use crate::schedule::{CronTrigger, StartupDecision, decide_startup};

/// Runs one cycle while holding the vault's cycle lock.
pub async fn run_locked_cycle(orchestrator: &CleanupOrchestrator) -> Result<CycleReport> {
    let _lock = CycleLock::acquire(&orchestrator.lock_path())?;
    Ok(orchestrator.run_cycle().await?)
}

/// Long-running mode: the optional startup check, then the cron schedule
/// until `shutdown` fires.  Cycle failures are logged and never end the
/// loop.
pub async fn run_service(
    orchestrator: Arc<CleanupOrchestrator>,
    config: &AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let trigger = CronTrigger::from_config(&config.schedule)?;

    if config.schedule.run_on_startup {
        let last_run = orchestrator.store().get_last_run().await;
        let min_interval = config.schedule.min_interval_hours;
        let decision = decide_startup(last_run, Utc::now(), min_interval);
        match decision {
            StartupDecision::FirstRun => info!("first run detected, running cleanup"),
            StartupDecision::Due { hours_since } => info!(
                hours_since = %format!("{hours_since:.1}"),
                "cleanup overdue, running now"
            ),
            StartupDecision::NotDue { hours_since } => info!(
                hours_since = %format!("{hours_since:.1}"),
                min_interval_hours = min_interval,
                "last cleanup is recent, skipping startup run"
            ),
        }
        if decision.should_run() {
            log_cycle(run_locked_cycle(&orchestrator).await);
        }
    }

    trigger
        .run(shutdown, || {
            let orchestrator = orchestrator.clone();
            async move {
                log_cycle(run_locked_cycle(&orchestrator).await);
            }
        })
        .await;
    Ok(())
}

fn log_cycle(result: Result<CycleReport>) {
    match result {
        Ok(report) => info!(
            cycle_id = %report.cycle_id,
            archived = report.archived.len(),
            edited = report.edited.len(),
            "scheduled cleanup finished"
        ),
        Err(err) => error!(?err, "scheduled cleanup failed"),
    }
}
