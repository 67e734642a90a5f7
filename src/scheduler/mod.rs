//! Cron-driven job scheduler.
//!
//! One timer task per scheduler sleeps until the next fire time and then
//! triggers the job. At most one run is active at a time: a trigger that
//! arrives while the previous run is still going is coalesced. A trigger
//! that wakes up later than the misfire grace is skipped and the next fire
//! time is computed from now, so missed runs never pile up.

pub mod job;
pub mod schedule;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;

pub use job::{DiscoveryJob, DiscoverySummary, ScheduledJob};
pub use schedule::CronSchedule;

/// Default misfire grace.
pub const DEFAULT_MISFIRE_GRACE: Duration = Duration::from_secs(60);

/// Result of a single trigger attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// A new run was started.
    Started,
    /// A run was already active; this trigger was dropped.
    Coalesced,
}

/// What the timer did with a scheduled fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Fired(FireOutcome),
    /// Woke up past the misfire grace; run skipped.
    Missed,
}

/// Read-only scheduler view for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub name: String,
    pub schedule: String,
    pub running: bool,
    pub runs_total: u64,
    pub coalesced_total: u64,
    pub missed_total: u64,
    pub next_fire: Option<DateTime<Utc>>,
}

struct SchedulerInner {
    name: String,
    schedule: CronSchedule,
    job: Arc<dyn ScheduledJob>,
    misfire_grace: Duration,
    running: AtomicBool,
    stopped: AtomicBool,
    stop: Notify,
    runs_total: AtomicU64,
    coalesced_total: AtomicU64,
    missed_total: AtomicU64,
    next_fire: Mutex<Option<DateTime<Utc>>>,
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard(Arc<SchedulerInner>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

impl SchedulerInner {
    fn fire(self: &Arc<Self>) -> FireOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.coalesced_total.fetch_add(1, Ordering::SeqCst);
            debug!(scheduler = %self.name, "Previous run still active, trigger coalesced");
            return FireOutcome::Coalesced;
        }

        let run = self.runs_total.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = RunningGuard(self.clone());
        let job = self.job.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            let _guard = guard;
            info!(scheduler = %name, job = job.name(), run, "Scheduled run started");
            match job.run().await {
                Ok(()) => info!(scheduler = %name, run, "Scheduled run finished"),
                Err(e) => error!(scheduler = %name, run, error = %e, "Scheduled run failed"),
            }
        });

        FireOutcome::Started
    }

    fn trigger(self: &Arc<Self>, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> TriggerOutcome {
        let late = (now - scheduled).to_std().unwrap_or(Duration::ZERO);
        if late > self.misfire_grace {
            self.missed_total.fetch_add(1, Ordering::SeqCst);
            warn!(
                scheduler = %self.name,
                scheduled = %scheduled,
                late_secs = late.as_secs(),
                "Fire time missed beyond grace, skipping"
            );
            return TriggerOutcome::Missed;
        }
        TriggerOutcome::Fired(self.fire())
    }

    /// First fire time after `now` that is also after the last fired slot.
    fn next_fire_after(
        &self,
        now: DateTime<Utc>,
        last: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let from = last.map_or(now, |last| now.max(last));
        self.schedule.next_after(from)
    }

    fn set_next_fire(&self, next: Option<DateTime<Utc>>) {
        *self.next_fire.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    async fn timer_loop(self: Arc<Self>) {
        info!(scheduler = %self.name, schedule = self.schedule.expr(), "Scheduler started");

        let mut last = None;
        while !self.stopped.load(Ordering::SeqCst) {
            let now = Utc::now();
            let Some(next) = self.next_fire_after(now, last) else {
                warn!(scheduler = %self.name, "Schedule has no further fire times");
                break;
            };
            self.set_next_fire(Some(next));

            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.stop.notified() => break,
            }
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            self.trigger(next, Utc::now());
            last = Some(next);
        }

        self.set_next_fire(None);
        info!(scheduler = %self.name, "Scheduler stopped");
    }
}

/// Fires a job on a cron schedule.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        name: impl Into<String>,
        schedule: CronSchedule,
        job: Arc<dyn ScheduledJob>,
        misfire_grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                name: name.into(),
                schedule,
                job,
                misfire_grace,
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                stop: Notify::new(),
                runs_total: AtomicU64::new(0),
                coalesced_total: AtomicU64::new(0),
                missed_total: AtomicU64::new(0),
                next_fire: Mutex::new(None),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the timer task.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            return Err(SchedulerError::AlreadyStarted {
                name: self.inner.name.clone(),
            });
        }
        *handle = Some(tokio::spawn(self.inner.clone().timer_loop()));
        Ok(())
    }

    /// Halt the timer loop. An in-flight run is left to finish.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.stop.notify_one();
    }

    /// Wait for the timer task to exit.
    pub async fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Trigger the job now through the overlap guard.
    pub fn fire(&self) -> FireOutcome {
        self.inner.fire()
    }

    /// Handle a fire time the timer woke up for at `now`.
    pub fn trigger(&self, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> TriggerOutcome {
        self.inner.trigger(scheduled, now)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SchedulerStatus {
        let inner = &self.inner;
        SchedulerStatus {
            name: inner.name.clone(),
            schedule: inner.schedule.expr().to_string(),
            running: inner.running.load(Ordering::SeqCst),
            runs_total: inner.runs_total.load(Ordering::SeqCst),
            coalesced_total: inner.coalesced_total.load(Ordering::SeqCst),
            missed_total: inner.missed_total.load(Ordering::SeqCst),
            next_fire: *inner.next_fire.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}
