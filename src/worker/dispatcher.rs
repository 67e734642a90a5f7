//! Worker dispatcher: the polling loop that drives every lane.
//!
//! Each cycle asks every lane, in order, to claim one item. If any lane
//! claimed something the loop goes straight into the next cycle; otherwise
//! it sleeps for the poll interval. `stop()` interrupts the sleep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::worker::lane::{Lane, LaneStatus};

/// How the dispatcher waits between cycles.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper: a zero duration yields, anything else sleeps.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}

pub struct WorkerDispatcher {
    lanes: Vec<Lane>,
    poll_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
    stopped: AtomicBool,
    wake: Notify,
}

impl WorkerDispatcher {
    pub fn new(lanes: Vec<Lane>, poll_interval: Duration) -> Self {
        Self::with_sleeper(lanes, poll_interval, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        lanes: Vec<Lane>,
        poll_interval: Duration,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            lanes,
            poll_interval,
            sleeper,
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Run one pass over every lane. Returns whether anything was claimed.
    pub async fn run_cycle(&self) -> bool {
        let mut did_work = false;
        for lane in &self.lanes {
            if self.is_stopped() {
                break;
            }
            let claimed = lane.claim_and_submit_batch().await;
            did_work |= claimed > 0;
        }
        did_work
    }

    /// Poll until `stop()` is called.
    pub async fn run(&self) {
        let names: Vec<&str> = self.lanes.iter().map(Lane::name).collect();
        info!(
            lanes = ?names,
            poll_interval_secs = self.poll_interval.as_secs(),
            "Worker dispatcher started"
        );

        while !self.is_stopped() {
            let did_work = self.run_cycle().await;
            if self.is_stopped() {
                break;
            }

            let pause = if did_work {
                Duration::ZERO
            } else {
                self.poll_interval
            };
            debug!(did_work, pause_ms = pause.as_millis() as u64, "Dispatcher cycle done");

            tokio::select! {
                _ = self.sleeper.sleep(pause) => {}
                _ = self.wake.notified() => {}
            }
        }

        info!("Worker dispatcher stopped");
    }

    /// Halt claiming and shut down every lane pool. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.wake.notify_one();
        for lane in &self.lanes {
            lane.shutdown();
        }
        info!("Worker dispatcher stop requested");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn statuses(&self) -> Vec<LaneStatus> {
        self.lanes.iter().map(Lane::status).collect()
    }
}

/// Spawn the dispatcher loop as a background task.
pub fn spawn_dispatcher(dispatcher: Arc<WorkerDispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        dispatcher.run().await;
    })
}
