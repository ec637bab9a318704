use std::fs;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use vaultsweep_config::TelemetryConfig;

/// Installs the global subscriber.  `RUST_LOG` wins over the configured
/// level.  The returned guard flushes the file writer and must live until
/// exit.
pub(crate) fn init(telemetry: &TelemetryConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&telemetry.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if telemetry.log_dir.trim().is_empty() {
        (None, None)
    } else {
        fs::create_dir_all(&telemetry.log_dir)
            .with_context(|| format!("failed to create log dir {}", telemetry.log_dir))?;
        let appender = tracing_appender::rolling::daily(&telemetry.log_dir, "vaultsweep.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}
