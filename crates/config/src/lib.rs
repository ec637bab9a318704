use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Vault ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault root.  A leading `~/` is expanded against `$HOME`.
    /// Overridden at runtime by `VAULTSWEEP_VAULT_PATH` when set.
    pub path: String,
    /// Hidden folder (relative to the vault root) that receives one dated
    /// subtree per cycle that archived something.
    pub archive_folder: String,
    /// First-level folder whose files count as new on a cold start.
    pub inbox_folder: String,
    /// File name of the persisted run state, stored at the vault root.
    pub state_file: String,
    /// Folder names pruned from every scan.  Names starting with `.` are
    /// always pruned whether or not they are listed here.
    pub excluded_folders: Vec<String>,
    /// Extensions (without the dot) eligible for header stamping.
    pub stamp_extensions: Vec<String>,
    /// Header key stamped on files the synthesis step touched.
    pub timestamp_key: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: ".".to_string(),
            archive_folder: ".archive".to_string(),
            inbox_folder: "Inbox".to_string(),
            state_file: ".vaultsweep-state.json".to_string(),
            excluded_folders: vec![
                ".obsidian".to_string(),
                ".trash".to_string(),
                ".git".to_string(),
                "node_modules".to_string(),
                "Templates".to_string(),
            ],
            stamp_extensions: vec!["md".to_string()],
            timestamp_key: "last_updated".to_string(),
        }
    }
}

impl VaultConfig {
    /// The vault root with `~/` expanded.
    pub fn root(&self) -> PathBuf {
        expand_home(&self.path)
    }

    /// File name of the cycle lock.  It sits next to the run state so every
    /// process working on the same vault contends for the same file.
    pub fn lock_file(&self) -> String {
        format!("{}.lock", self.state_file)
    }
}

// ── Run state ─────────────────────────────────────────────────────────────────

/// Retry policy for reading and writing the run-state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on every further attempt.
    pub initial_delay_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
        }
    }
}

// ── Schedule ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds-first cron expression (`sec min hour dom month dow`).
    pub cron: String,
    /// IANA timezone name (e.g. `"America/New_York"`).  Used to evaluate the
    /// cron expression and to derive the archive date key.  Falls back to
    /// UTC when the name is unrecognised.
    pub timezone: String,
    /// Minimum hours since the last cycle before the startup check runs one.
    pub min_interval_hours: u64,
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 30 2 * * *".to_string(),
            timezone: "UTC".to_string(),
            min_interval_hours: 20,
            run_on_startup: true,
        }
    }
}

// ── Synthesis ─────────────────────────────────────────────────────────────────

/// How the external synthesis agent is launched.
///
/// The program runs with the vault root as its working directory and
/// receives the user prompt on stdin.  The system prompt and the allowed
/// tool list are passed through `system_prompt_flag` / `allowed_tools_flag`;
/// an empty flag omits that argument entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub system_prompt_flag: String,
    pub allowed_tools_flag: String,
    pub allowed_tools: Vec<String>,
    /// Deadline for a single synthesis run.  `0` disables the deadline.
    pub timeout_minutes: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "claude".to_string(),
            args: vec![
                "-p".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
                "--permission-mode".to_string(),
                "acceptEdits".to_string(),
            ],
            system_prompt_flag: "--append-system-prompt".to_string(),
            allowed_tools_flag: "--allowedTools".to_string(),
            allowed_tools: ["Read", "Write", "Edit", "Glob", "Grep", "Bash"]
                .iter()
                .map(|tool| tool.to_string())
                .collect(),
            timeout_minutes: 0,
        }
    }
}

// ── Git ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Snapshot the vault with one commit per cycle when it is a git
    /// working tree.  Never fatal.
    pub enabled: bool,
    /// Attempt `git push` after committing.  A missing remote is normal.
    pub push: bool,
    pub author_name: String,
    pub author_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            push: true,
            author_name: "Vaultsweep".to_string(),
            author_email: "vaultsweep@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Directory for daily-rolling log files.  Empty logs to stderr only.
    pub log_dir: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub vault: VaultConfig,
    pub state: StateConfig,
    pub schedule: ScheduleConfig,
    pub synthesis: SynthesisConfig,
    pub git: GitConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Env overrides take precedence over the config file.  `lookup` is
    /// `std::env::var` in production.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("VAULTSWEEP_VAULT_PATH") {
            if !value.is_empty() {
                self.vault.path = value;
            }
        }
        if let Some(value) = lookup("VAULTSWEEP_LOG_LEVEL") {
            if !value.is_empty() {
                self.telemetry.log_level = value;
            }
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Absolute location of the run-state file.
    pub fn state_path(&self) -> PathBuf {
        self.vault.root().join(&self.vault.state_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.vault.root().join(self.vault.lock_file())
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(raw)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn vault_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.vault.archive_folder, ".archive");
        assert_eq!(cfg.vault.inbox_folder, "Inbox");
        assert_eq!(cfg.vault.timestamp_key, "last_updated");
        assert!(cfg.vault.excluded_folders.contains(&".obsidian".to_string()));
        assert!(cfg.vault.excluded_folders.contains(&"Templates".to_string()));
        assert_eq!(cfg.vault.stamp_extensions, vec!["md".to_string()]);
    }

    #[test]
    fn retry_and_schedule_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.state.max_attempts, 5);
        assert_eq!(cfg.state.initial_delay_ms, 100);
        assert_eq!(cfg.schedule.cron, "0 30 2 * * *");
        assert_eq!(cfg.schedule.timezone, "UTC");
        assert_eq!(cfg.schedule.min_interval_hours, 20);
        assert!(cfg.schedule.run_on_startup);
    }

    #[test]
    fn synthesis_and_git_defaults() {
        let cfg = AppConfig::default();
        assert!(cfg.synthesis.enabled);
        assert_eq!(cfg.synthesis.program, "claude");
        assert_eq!(cfg.synthesis.allowed_tools.len(), 6);
        assert_eq!(cfg.synthesis.timeout_minutes, 0);
        assert!(cfg.git.enabled);
        assert!(cfg.git.push);
        assert_eq!(cfg.telemetry.log_level, "info");
        assert!(cfg.telemetry.log_dir.is_empty());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.vault.archive_folder, ".archive");
        assert_eq!(cfg.state.max_attempts, 5);
    }

    #[test]
    fn load_from_valid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.toml");
        fs::write(
            &path,
            r#"
[vault]
path = "/srv/notes"
inbox_folder = "Capture"
excluded_folders = ["Templates", "Daily"]

[schedule]
cron = "0 0 3 * * *"
timezone = "Europe/London"

[synthesis]
enabled = false
timeout_minutes = 45

[git]
push = false
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.vault.path, "/srv/notes");
        assert_eq!(cfg.vault.inbox_folder, "Capture");
        assert_eq!(cfg.vault.excluded_folders, vec!["Templates", "Daily"]);
        assert_eq!(cfg.schedule.cron, "0 0 3 * * *");
        assert_eq!(cfg.schedule.timezone, "Europe/London");
        assert!(!cfg.synthesis.enabled);
        assert_eq!(cfg.synthesis.timeout_minutes, 45);
        assert!(!cfg.git.push);
        // Unspecified keys keep their defaults.
        assert_eq!(cfg.vault.archive_folder, ".archive");
        assert!(cfg.git.enabled);
        assert_eq!(cfg.synthesis.program, "claude");
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.vault.path = "/tmp/vault".to_string();
        cfg.schedule.min_interval_hours = 6;
        cfg.synthesis.allowed_tools = vec!["Read".to_string()];

        cfg.save_to(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.vault.path, "/tmp/vault");
        assert_eq!(loaded.schedule.min_interval_hours, 6);
        assert_eq!(loaded.synthesis.allowed_tools, vec!["Read".to_string()]);
    }

    #[test]
    fn state_path_joins_vault_root() {
        let mut cfg = AppConfig::default();
        cfg.vault.path = "/srv/notes".to_string();
        assert_eq!(
            cfg.state_path(),
            PathBuf::from("/srv/notes/.vaultsweep-state.json")
        );
    }

    #[test]
    fn lock_path_is_keyed_to_the_vault() {
        let mut cfg = AppConfig::default();
        cfg.vault.path = "/srv/notes".to_string();
        assert_eq!(
            cfg.lock_path(),
            PathBuf::from("/srv/notes/.vaultsweep-state.json.lock")
        );
    }

    #[test]
    fn tilde_expands_against_home() {
        let Ok(home) = env::var("HOME") else {
            return;
        };
        let expanded = expand_home("~/Notes");
        assert_eq!(expanded, Path::new(&home).join("Notes"));
        assert_eq!(expand_home("/abs/Notes"), PathBuf::from("/abs/Notes"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = AppConfig::default();
        cfg.vault.path = "/from/file".to_string();
        cfg.apply_overrides(|key| match key {
            "VAULTSWEEP_VAULT_PATH" => Some("/from/env".to_string()),
            "VAULTSWEEP_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(cfg.vault.path, "/from/env");
        assert_eq!(cfg.telemetry.log_level, "debug");
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut cfg = AppConfig::default();
        cfg.vault.path = "/from/file".to_string();
        cfg.apply_overrides(|_| Some(String::new()));
        assert_eq!(cfg.vault.path, "/from/file");
        assert_eq!(cfg.telemetry.log_level, "info");
    }
}
