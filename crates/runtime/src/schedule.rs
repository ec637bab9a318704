//! When a cycle runs: a recurring cron schedule plus an elapsed-time check
//! performed once at process start.  Both end up calling the same
//! orchestrator entry point.

use std::future::Future;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::watch;
use tracing::{info, warn};

use vaultsweep_config::ScheduleConfig;

/// IANA timezone by name, falling back to UTC with a warning.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        warn!(tz = %name, "unrecognised timezone, falling back to UTC");
        chrono_tz::UTC
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartupDecision {
    FirstRun,
    Due { hours_since: f64 },
    NotDue { hours_since: f64 },
}

impl StartupDecision {
    pub fn should_run(&self) -> bool {
        !matches!(self, Self::NotDue { .. })
    }
}

/// Whether a cycle is owed at startup: always on a first run, otherwise
/// once at least `min_interval_hours` have passed since the last one.
pub fn decide_startup(
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    min_interval_hours: u64,
) -> StartupDecision {
    let Some(last_run) = last_run else {
        return StartupDecision::FirstRun;
    };
    let hours_since = (now - last_run).num_milliseconds() as f64 / 3_600_000.0;
    if hours_since >= min_interval_hours as f64 {
        StartupDecision::Due { hours_since }
    } else {
        StartupDecision::NotDue { hours_since }
    }
}

#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl CronTrigger {
    pub fn new(expression: &str, timezone: Tz) -> Result<Self> {
        let schedule = Schedule::from_str(expression)
            .with_context(|| format!("invalid cron expression {expression:?}"))?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(&config.cron, parse_timezone(&config.timezone))
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Tz>> {
        self.schedule.after(&after.with_timezone(&self.timezone)).next()
    }

    /// Fires `job` at every scheduled time until `shutdown` flips to `true`
    /// or its sender goes away.  A running job is never interrupted.
    pub async fn run<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(cron = %self.expression, tz = %self.timezone, "schedule started");
        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire(now) else {
                warn!(cron = %self.expression, "schedule has no upcoming fire time, stopping");
                return;
            };
            let wait = (next.with_timezone(&Utc) - now).to_std().unwrap_or_default();
            info!(next = %next.to_rfc3339(), "next cleanup scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => job().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("schedule stopped");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::sync::watch;

    use super::{CronTrigger, StartupDecision, decide_startup, parse_timezone};

    #[test]
    fn startup_decision_follows_elapsed_hours() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(decide_startup(None, now, 20), StartupDecision::FirstRun);

        let recent = now - chrono::Duration::hours(3);
        assert_eq!(
            decide_startup(Some(recent), now, 20),
            StartupDecision::NotDue { hours_since: 3.0 }
        );
        assert!(!decide_startup(Some(recent), now, 20).should_run());

        let exactly = now - chrono::Duration::hours(20);
        assert_eq!(
            decide_startup(Some(exactly), now, 20),
            StartupDecision::Due { hours_since: 20.0 }
        );
        assert!(StartupDecision::FirstRun.should_run());
    }

    #[test]
    fn next_fire_respects_timezone() {
        let after = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        let utc = CronTrigger::new("0 30 2 * * *", chrono_tz::UTC).unwrap();
        let next = utc.next_fire(after).unwrap();
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2025, 3, 1, 2, 30, 0).unwrap());

        let ny = CronTrigger::new("0 30 2 * * *", parse_timezone("America/New_York")).unwrap();
        let next = ny.next_fire(after).unwrap();
        // 02:30 EST on 2025-03-01 is 07:30 UTC.
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2025, 3, 1, 7, 30, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(CronTrigger::new("every night please", chrono_tz::UTC).is_err());
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        assert_eq!(parse_timezone("Mars/Olympus_Mons"), chrono_tz::UTC);
        assert_eq!(parse_timezone("Europe/London"), chrono_tz::Europe::London);
    }

    #[tokio::test]
    async fn run_fires_and_stops_on_shutdown() {
        let trigger = CronTrigger::new("* * * * * *", chrono_tz::UTC).unwrap();
        let (tx, rx) = watch::channel(false);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let handle = tokio::spawn(async move {
            trigger
                .run(rx, || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while fired.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
