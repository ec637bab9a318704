//! Cycle orchestration and the triggers that start cycles.

pub mod lock;
pub mod orchestrator;
pub mod schedule;
pub mod service;

pub use lock::CycleLock;
pub use orchestrator::{CleanupOrchestrator, CyclePhase, CycleReport, OrchestratorParts};
pub use schedule::{CronTrigger, StartupDecision, decide_startup, parse_timezone};
pub use service::{run_locked_cycle, run_service};
