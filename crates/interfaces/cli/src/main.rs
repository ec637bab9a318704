mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use vaultsweep_config::{AppConfig, DEFAULT_CONFIG_PATH};

#[derive(Debug, Parser)]
#[command(
    name = "vaultsweep",
    version,
    about = "Periodic archival and cleanup of a Markdown note vault"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one cleanup cycle now.
    Run,
    /// Run the startup check, then cycles on the configured schedule until Ctrl-C.
    Start,
    /// Show the last run, the next scheduled run and the resolved paths.
    Status,
    /// List changed files and how they would be classified.  Changes nothing.
    Scan,
    /// Write the default configuration to the config path.
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Some(Commands::InitConfig { force }) = cli.command {
        return commands::init_config(&cli.config, force);
    }

    let config = AppConfig::load_from(&cli.config)?;
    let _log_guard = logging::init(&config.telemetry)?;

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Run => commands::run_once(&config).await,
        Commands::Start => commands::start(config).await,
        Commands::Status => commands::status(&config).await,
        Commands::Scan => commands::scan(&config).await,
        Commands::InitConfig { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use tempfile::TempDir;

    use super::{Cli, Commands};
    use crate::commands::init_config;
    use vaultsweep_config::AppConfig;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["vaultsweep", "scan", "--config", "/tmp/v.toml"]);
        assert!(matches!(cli.command, Some(Commands::Scan)));
        assert_eq!(cli.config, std::path::PathBuf::from("/tmp/v.toml"));

        let cli = Cli::parse_from(["vaultsweep"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, std::path::PathBuf::from("config/default.toml"));
    }

    #[test]
    fn init_config_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config/default.toml");

        init_config(&path, false).unwrap();
        let written = AppConfig::load_from(&path).unwrap();
        assert_eq!(written.vault.archive_folder, ".archive");

        assert!(init_config(&path, false).is_err());
        assert!(init_config(&path, true).is_ok());
    }
}
