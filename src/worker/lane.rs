//! Lane: single-flight claim-and-submit over one pipeline stage.
//!
//! A lane asks its handler for at most one eligible item, marks itself busy,
//! and hands the business step to its worker pool. The busy flag is released
//! by a drop guard inside the submitted task, so success, error, panic, and
//! cancellation all clear it exactly once.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::error::LaneError;
use crate::model::ContentPost;
use crate::worker::pool::WorkerPool;

/// Result of a lane's claim query.
#[derive(Debug)]
pub enum Claim {
    /// Nothing eligible.
    Empty,
    /// Resolved inline during the claim; nothing to submit.
    Settled,
    /// One item to process.
    Item(ContentPost),
}

/// How a business step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The item's status was recorded.
    Done,
    /// Nothing was recorded; the item stays eligible.
    Skipped,
}

/// Stage-specific behaviour plugged into a [`Lane`].
#[async_trait]
pub trait LaneHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Find at most one eligible item.
    async fn claim(&self) -> Result<Claim, LaneError>;

    /// Execute the business step for a claimed item.
    async fn run(&self, item: ContentPost) -> Result<TaskOutcome, LaneError>;
}

/// Read-only view of a lane for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneStatus {
    pub name: String,
    pub busy: bool,
    pub current_item: Option<String>,
    pub claimed_total: u64,
    pub completed_total: u64,
    pub skipped_total: u64,
    pub failed_total: u64,
}

#[derive(Debug, Default)]
struct LaneState {
    busy: bool,
    current_item: Option<String>,
    claimed_total: u64,
    completed_total: u64,
    skipped_total: u64,
    failed_total: u64,
}

/// Holds the busy flag for one in-flight task and clears it on drop.
struct BusyGuard {
    state: Arc<Mutex<LaneState>>,
    outcome: Option<TaskOutcome>,
}

impl BusyGuard {
    fn acquire(state: Arc<Mutex<LaneState>>, item_id: &str) -> Self {
        {
            let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
            s.busy = true;
            s.current_item = Some(item_id.to_string());
            s.claimed_total += 1;
        }
        Self {
            state,
            outcome: None,
        }
    }

    fn finished(&mut self, outcome: TaskOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        s.busy = false;
        s.current_item = None;
        match self.outcome {
            Some(TaskOutcome::Done) => s.completed_total += 1,
            Some(TaskOutcome::Skipped) => s.skipped_total += 1,
            // Error, panic, or dropped before running.
            None => s.failed_total += 1,
        }
    }
}

/// One pipeline stage with its own pool and busy flag.
pub struct Lane {
    handler: Arc<dyn LaneHandler>,
    pool: WorkerPool,
    state: Arc<Mutex<LaneState>>,
    claim_lock: tokio::sync::Mutex<()>,
}

impl Lane {
    pub fn new(handler: Arc<dyn LaneHandler>, concurrency: usize) -> Self {
        let pool = WorkerPool::new(handler.name(), concurrency);
        Self {
            handler,
            pool,
            state: Arc::new(Mutex::new(LaneState::default())),
            claim_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).busy
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Claim at most one item and submit it. Returns the number submitted.
    pub async fn claim_and_submit_batch(&self) -> usize {
        let _claim = self.claim_lock.lock().await;
        let lane = self.handler.name();

        if self.is_busy() {
            debug!(lane, "Lane busy, skipping claim");
            return 0;
        }

        let item = match self.handler.claim().await {
            Ok(Claim::Item(item)) => item,
            Ok(Claim::Empty) | Ok(Claim::Settled) => return 0,
            Err(e) => {
                warn!(lane, error = %e, "Claim query failed");
                return 0;
            }
        };

        let item_id = item.id.clone();
        let mut guard = BusyGuard::acquire(self.state.clone(), &item_id);
        let handler = self.handler.clone();
        let span = info_span!("lane_task", lane, item_id = %item_id);

        let task = async move {
            let item_id = item.id.clone();
            match handler.run(item).await {
                Ok(outcome) => {
                    debug!(?outcome, "Lane task finished");
                    guard.finished(outcome);
                }
                Err(e) => {
                    error!(lane = handler.name(), item_id = %item_id, error = %e, "Lane task failed");
                }
            }
        }
        .instrument(span);

        match self.pool.submit(task) {
            Ok(()) => {
                debug!(lane, item_id = %item_id, "Submitted item");
                1
            }
            Err(e) => {
                warn!(lane, item_id = %item_id, error = %e, "Pool refused submission");
                0
            }
        }
    }

    pub fn status(&self) -> LaneStatus {
        let s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        LaneStatus {
            name: self.handler.name().to_string(),
            busy: s.busy,
            current_item: s.current_item.clone(),
            claimed_total: s.claimed_total,
            completed_total: s.completed_total,
            skipped_total: s.skipped_total,
            failed_total: s.failed_total,
        }
    }

    /// Stop the pool. Queued tasks are dropped, which releases busy.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
