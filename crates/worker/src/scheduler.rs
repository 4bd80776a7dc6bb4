//! Daily retention scheduler.
//!
//! One scheduler per process, built in `main` and shared with the API for its
//! stats endpoint. It arms itself only when every environment gate passes at
//! [`RetentionScheduler::initialize`]; otherwise it stays dormant for the life
//! of the process. Runs are single-flight: a fire that lands while a run is in
//! progress is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use collector_core::limits::{SCHEDULER_HEALTHY_WINDOW_HOURS, SCHEDULER_MAX_ERRORS};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::SchedulerError;
use crate::notifications::{Notification, Notifier};
use crate::retention::{RetentionJob, RunSummary};

const DEFAULT_HOUR: u32 = 3;
const RESTRICTED_RUNTIMES: &[&str] = &["edge", "worker"];

/// When the daily run fires, in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub hour: u32,
    pub minute: u32,
    /// Webhook receiving critical alerts (production only)
    pub alert_webhook: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hour: DEFAULT_HOUR,
            minute: 0,
            alert_webhook: None,
        }
    }
}

impl SchedulerConfig {
    pub fn fire_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_else(|| {
            warn!(
                hour = self.hour,
                minute = self.minute,
                "Invalid scheduler time, using 03:00 UTC"
            );
            NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0).unwrap_or(NaiveTime::MIN)
        })
    }
}

/// The first occurrence of `at` strictly after `now`.
pub fn next_fire(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Conditions that must all hold for the scheduler to arm.
#[derive(Debug, Clone, Default)]
pub struct SchedulerGates {
    pub environment: String,
    /// Set while the artifact is being built
    pub build_phase: Option<String>,
    /// Execution context, e.g. `edge`
    pub runtime: Option<String>,
}

impl SchedulerGates {
    /// Reads `PULSE_BUILD_PHASE` and `PULSE_RUNTIME`.
    pub fn from_env(environment: impl Into<String>) -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v: &String| !v.is_empty());
        Self {
            environment: environment.into(),
            build_phase: var("PULSE_BUILD_PHASE"),
            runtime: var("PULSE_RUNTIME"),
        }
    }

    pub fn production() -> Self {
        Self {
            environment: "production".into(),
            ..Default::default()
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// `Err` names the first gate that failed.
    pub fn check(&self) -> Result<(), &'static str> {
        if !self.is_production() {
            return Err("not a production environment");
        }
        if self.build_phase.is_some() {
            return Err("build in progress");
        }
        if let Some(runtime) = &self.runtime {
            if RESTRICTED_RUNTIMES
                .iter()
                .any(|r| runtime.eq_ignore_ascii_case(r))
            {
                return Err("restricted runtime");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    #[default]
    Dormant,
    Armed,
    Running,
    ShutDown,
}

/// Process-local run statistics. Reset on restart.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub state: SchedulerState,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_count: u64,
    pub total_runs: u64,
    pub is_running: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_summary: Option<RunSummary>,
}

impl SchedulerStats {
    /// Unhealthy only when failures pile up without a recent success.
    pub fn is_healthy(&self, now: DateTime<Utc>) -> bool {
        if self.last_run.is_none() || self.is_running {
            return true;
        }
        let recent_success = self
            .last_success
            .is_some_and(|at| now - at < Duration::hours(SCHEDULER_HEALTHY_WINDOW_HOURS));

        recent_success || self.error_count <= SCHEDULER_MAX_ERRORS
    }
}

#[derive(Debug, Default)]
struct Inner {
    armed: bool,
    gates_checked: bool,
    shut_down: bool,
    stats: SchedulerStats,
}

/// Clears the single-flight flag when a run ends, including on panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RetentionScheduler {
    job: RetentionJob,
    config: SchedulerConfig,
    gates: SchedulerGates,
    notifier: Notifier,
    running: AtomicBool,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

impl RetentionScheduler {
    pub fn new(job: RetentionJob, config: SchedulerConfig, gates: SchedulerGates) -> Self {
        let notifier = Notifier::from_webhook(config.alert_webhook.as_deref());
        Self {
            job,
            config,
            gates,
            notifier,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Arms the daily timer if the gates pass. Returns the next run time.
    ///
    /// Idempotent: once armed, later calls return the same time. A scheduler
    /// that failed its gates stays dormant.
    pub fn initialize(self: &Arc<Self>) -> Option<DateTime<Utc>> {
        let next = {
            let mut inner = self.inner.lock();
            if inner.armed {
                return inner.stats.next_run;
            }
            if inner.gates_checked || inner.shut_down {
                return None;
            }
            inner.gates_checked = true;

            if let Err(reason) = self.gates.check() {
                info!(
                    reason,
                    environment = %self.gates.environment,
                    "Retention scheduler dormant"
                );
                return None;
            }

            let next = next_fire(Utc::now(), self.config.fire_time());
            inner.armed = true;
            inner.stats.next_run = Some(next);
            next
        };

        tokio::spawn(self.clone().run_timer(next));
        info!(next_run = %next, "Retention scheduler armed");
        Some(next)
    }

    async fn run_timer(self: Arc<Self>, mut next: DateTime<Utc>) {
        loop {
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Retention timer stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            // In-flight runs are detached so shutdown never aborts them.
            let scheduler = self.clone();
            tokio::spawn(async move {
                if let Err(e) = scheduler.run_now().await {
                    error!(error = %e, "Scheduled retention run failed");
                }
            });

            next = next_fire(Utc::now().max(next), self.config.fire_time());
            self.inner.lock().stats.next_run = Some(next);
        }
    }

    /// Runs the job immediately. `Ok(None)` when a run is already in progress.
    pub async fn run_now(&self) -> Result<Option<RunSummary>, SchedulerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Retention run already in progress, skipping");
            return Ok(None);
        }
        let _guard = RunGuard(&self.running);

        let started_at = Utc::now();
        {
            let mut inner = self.inner.lock();
            inner.stats.last_run = Some(started_at);
            inner.stats.total_runs += 1;
        }
        metrics().retention.runs.inc();

        let timer = Instant::now();
        let result = self.job.run(started_at).await;
        metrics()
            .retention_latency
            .observe(timer.elapsed().as_millis() as u64);

        match result {
            Ok(summary) => {
                metrics().retention.rows_purged.inc_by(summary.rows_deleted());
                let mut inner = self.inner.lock();
                inner.stats.last_success = Some(Utc::now());
                inner.stats.last_summary = Some(summary.clone());
                Ok(Some(summary))
            }
            Err(e) => {
                metrics().retention.failures.inc();
                let error_count = {
                    let mut inner = self.inner.lock();
                    inner.stats.last_error = Some(e.to_string());
                    inner.stats.error_count += 1;
                    inner.stats.error_count
                };

                error!(
                    severity = "critical",
                    error = %e,
                    error_count,
                    "CRITICAL: retention run failed"
                );

                if self.gates.is_production() {
                    self.notifier
                        .send(&Notification::RetentionFailed {
                            message: e.to_string(),
                            error_count,
                            occurred_at: Utc::now(),
                        })
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Cancels the pending timer. A run already in progress finishes.
    pub fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            inner.shut_down = true;
            inner.armed = false;
            inner.stats.next_run = None;
        }
        self.cancel.cancel();
        info!("Retention scheduler shut down");
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.inner.lock();
        let is_running = self.running.load(Ordering::Acquire);
        let state = if inner.shut_down {
            SchedulerState::ShutDown
        } else if is_running {
            SchedulerState::Running
        } else if inner.armed {
            SchedulerState::Armed
        } else {
            SchedulerState::Dormant
        };

        SchedulerStats {
            state,
            is_running,
            ..inner.stats.clone()
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.stats().is_healthy(Utc::now())
    }
}
