use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use vaultsweep_config::SynthesisConfig;

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// The vault root.
    pub working_dir: PathBuf,
    pub system_prompt: String,
    pub user_prompt: String,
    pub allowed_tools: Vec<String>,
}

/// One parsed line of the collaborator's JSON event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisEvent {
    pub kind: String,
    pub subtype: Option<String>,
    pub raw: Value,
}

impl SynthesisEvent {
    fn parse(line: &str) -> Option<Self> {
        let raw: Value = serde_json::from_str(line).ok()?;
        let kind = raw.get("type")?.as_str()?.to_string();
        let subtype = raw
            .get("subtype")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self { kind, subtype, raw })
    }

    fn is_terminal(&self) -> bool {
        self.kind == "result"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisStatus {
    Succeeded { result: String },
    /// Terminal event arrived with a non-success subtype.
    Failed { subtype: String },
    /// No usable terminal event: spawn failure, crash, timeout.
    Errored(String),
    Skipped,
}

impl fmt::Display for SynthesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { .. } => write!(f, "succeeded"),
            Self::Failed { subtype } => write!(f, "failed ({subtype})"),
            Self::Errored(reason) => write!(f, "errored: {reason}"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisReport {
    pub status: SynthesisStatus,
    pub events: Vec<SynthesisEvent>,
}

impl SynthesisReport {
    pub fn skipped() -> Self {
        Self {
            status: SynthesisStatus::Skipped,
            events: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, SynthesisStatus::Succeeded { .. })
    }
}

/// The external collaborator that turns archived and edited notes into
/// organised ones.
///
/// Implementations never fail the cycle: every problem is folded into the
/// returned status.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> SynthesisReport;
}

pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    async fn synthesize(&self, _request: SynthesisRequest) -> SynthesisReport {
        info!("synthesis disabled, skipping");
        SynthesisReport::skipped()
    }
}

/// Runs the collaborator as a child process speaking newline-delimited
/// JSON on stdout.  The user prompt goes in on stdin.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    system_prompt_flag: String,
    allowed_tools_flag: String,
    timeout: Option<Duration>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            system_prompt_flag: String::new(),
            allowed_tools_flag: String::new(),
            timeout: None,
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            system_prompt_flag: config.system_prompt_flag.clone(),
            allowed_tools_flag: config.allowed_tools_flag.clone(),
            timeout: (config.timeout_minutes > 0)
                .then(|| Duration::from_secs(config.timeout_minutes.saturating_mul(60))),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self, request: &SynthesisRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if !self.system_prompt_flag.is_empty() {
            cmd.arg(&self.system_prompt_flag).arg(&request.system_prompt);
        }
        if !self.allowed_tools_flag.is_empty() && !request.allowed_tools.is_empty() {
            cmd.arg(&self.allowed_tools_flag)
                .arg(request.allowed_tools.join(","));
        }
        cmd.current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Reads events until stdout closes, then reaps the child.
    async fn drive(
        child: &mut Child,
        stdout: ChildStdout,
        events: &mut Vec<SynthesisEvent>,
    ) -> std::io::Result<ExitStatus> {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match SynthesisEvent::parse(line) {
                Some(event) => {
                    debug!(kind = %event.kind, subtype = ?event.subtype, "synthesis event");
                    events.push(event);
                }
                None => debug!(%line, "ignoring non-event output"),
            }
        }
        child.wait().await
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> SynthesisReport {
        let mut events = Vec::new();
        let errored = |reason: String, events: Vec<SynthesisEvent>| {
            warn!(%reason, "synthesis errored");
            SynthesisReport {
                status: SynthesisStatus::Errored(reason),
                events,
            }
        };

        let mut child = match self.command(&request).spawn() {
            Ok(child) => child,
            Err(err) => return errored(format!("failed to spawn {}: {err}", self.program), events),
        };
        info!(program = %self.program, cwd = %request.working_dir.display(), "synthesis started");

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = request.user_prompt.clone();
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                    debug!(?err, "collaborator closed stdin early");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "vaultsweep::synthesis", "{line}");
                }
            });
        }
        let Some(stdout) = child.stdout.take() else {
            return errored("collaborator stdout unavailable".to_string(), events);
        };

        let exit = match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, Self::drive(&mut child, stdout, &mut events)).await {
                    Ok(exit) => exit,
                    Err(_) => {
                        let _ = child.kill().await;
                        return errored(format!("timed out after {}s", limit.as_secs_f64()), events);
                    }
                }
            }
            None => Self::drive(&mut child, stdout, &mut events).await,
        };
        let exit = match exit {
            Ok(status) => status,
            Err(err) => return errored(format!("reading collaborator output failed: {err}"), events),
        };

        let terminal = events.iter().rev().find(|event| event.is_terminal());
        let status = match terminal {
            Some(event) if event.subtype.as_deref() == Some("success") => SynthesisStatus::Succeeded {
                result: event
                    .raw
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some(event) => SynthesisStatus::Failed {
                subtype: event.subtype.clone().unwrap_or_else(|| "unknown".to_string()),
            },
            None if !exit.success() => {
                return errored(format!("collaborator exited with {exit}"), events);
            }
            None => return errored("stream ended without a result event".to_string(), events),
        };

        match &status {
            SynthesisStatus::Succeeded { .. } => info!(events = events.len(), "synthesis succeeded"),
            other => warn!(status = %other, events = events.len(), "synthesis did not succeed"),
        }
        SynthesisReport { status, events }
    }
}
