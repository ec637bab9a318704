use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use vaultsweep_config::AppConfig;
use vaultsweep_runtime::{CleanupOrchestrator, CronTrigger, CycleReport, run_locked_cycle, run_service};
use vaultsweep_vault::Outcome;

pub(crate) async fn run_once(config: &AppConfig) -> Result<()> {
    let orchestrator = CleanupOrchestrator::from_config(config);
    let report = run_locked_cycle(&orchestrator).await?;
    print_report(&report);
    Ok(())
}

pub(crate) async fn start(config: AppConfig) -> Result<()> {
    let orchestrator = Arc::new(CleanupOrchestrator::from_config(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    run_service(orchestrator, &config, shutdown_rx).await
}

pub(crate) async fn status(config: &AppConfig) -> Result<()> {
    let orchestrator = CleanupOrchestrator::from_config(config);
    let trigger = CronTrigger::from_config(&config.schedule)?;

    println!("vaultsweep status");
    println!("- vault      : {}", orchestrator.vault_root().display());
    println!("- state file : {}", orchestrator.store().path().display());
    println!("- lock file  : {}", orchestrator.lock_path().display());
    match orchestrator.store().load().await {
        Some(state) => println!("- last run   : {}", state.last_run_date),
        None => println!("- last run   : (never)"),
    }
    match trigger.next_fire(Utc::now()) {
        Some(next) => println!("- next run   : {} ({})", next.to_rfc3339(), trigger.expression()),
        None => println!("- next run   : (none scheduled)"),
    }
    println!(
        "- synthesis  : {}",
        if config.synthesis.enabled { config.synthesis.program.as_str() } else { "disabled" }
    );
    Ok(())
}

/// Lists what the next cycle would pick up.  Touches nothing.
pub(crate) async fn scan(config: &AppConfig) -> Result<()> {
    let orchestrator = CleanupOrchestrator::from_config(config);
    let watermark = orchestrator.store().get_last_run().await;
    let files = orchestrator
        .scanner()
        .scan(orchestrator.vault_root(), watermark);
    let batch = orchestrator.classifier().partition(files, watermark);

    match watermark {
        Some(ts) => println!("changes since {}", ts.to_rfc3339()),
        None => println!("no previous run: cold start"),
    }
    for file in &batch.new {
        println!("  new     {}", file.relative_display());
    }
    for file in &batch.edited {
        println!("  edited  {}", file.relative_display());
    }
    println!("({} new, {} edited)", batch.new.len(), batch.edited.len());
    Ok(())
}

pub(crate) fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AppConfig::default().save_to(path)?;
    println!("wrote default configuration to {}", path.display());
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("cycle {} finished", report.cycle_id);
    println!("- cold start : {}", report.cold_start);
    println!("- scanned    : {}", report.scanned);
    if report.short_circuited() {
        println!("- nothing changed since the last run");
    } else {
        println!(
            "- archived   : {} ({} failed) under {}",
            report.archived.len(),
            report.archive_failures,
            report.date_key
        );
        println!("- edited     : {}", report.edited.len());
        if let Some(synthesis) = &report.synthesis {
            println!("- synthesis  : {}", synthesis.status);
        }
        println!("- stamped    : {}", report.stamp.stamped());
        match &report.commit {
            Some(Outcome::Success(summary)) => println!(
                "- commit     : {}{}",
                summary.message,
                if summary.pushed { " (pushed)" } else { "" }
            ),
            Some(other) => println!("- commit     : {other}"),
            None => println!("- commit     : disabled"),
        }
    }
    println!("- recorded   : {}", report.persisted.last_run_date);
}
