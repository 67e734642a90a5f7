//! Bounded worker pool.
//!
//! A fixed number of tokio tasks pull boxed futures off a shared queue.
//! Each job runs in its own spawned task so a panic is contained to that
//! job and the worker keeps going.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::PoolError;

type Job = BoxFuture<'static, ()>;

/// Shared counters and flags visible to both the pool handle and its workers.
struct PoolShared {
    name: String,
    closed: AtomicBool,
    queued: AtomicUsize,
    submitted: AtomicU64,
}

/// Fixed-width pool of tokio workers.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: usize,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks (at least one). Must be called inside a runtime.
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        let workers = workers.max(1);
        let shared = Arc::new(PoolShared {
            name: name.into(),
            closed: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
        });

        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|idx| tokio::spawn(worker_loop(idx, shared.clone(), rx.clone())))
            .collect();

        debug!(pool = %shared.name, workers, "Worker pool started");

        Self {
            shared,
            workers,
            tx: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
        }
    }

    /// Queue a task. Fire-and-forget; fails once the pool is shut down.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let closed = || PoolError::Closed {
            pool: self.shared.name.clone(),
        };

        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(closed());
        }

        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = tx.as_ref() else {
            return Err(closed());
        };

        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if tx.send(task.boxed()).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(closed());
        }
        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting work. Queued tasks are dropped; running tasks finish.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        info!(pool = %self.shared.name, queued = self.queued(), "Worker pool shut down");
    }

    /// Wait for every worker to exit. Call after `shutdown`.
    pub async fn join(&self) {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Tasks accepted since the pool started.
    pub fn submitted_total(&self) -> u64 {
        self.shared.submitted.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn worker_loop(
    idx: usize,
    shared: Arc<PoolShared>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };
        shared.queued.fetch_sub(1, Ordering::SeqCst);

        if shared.closed.load(Ordering::SeqCst) {
            debug!(pool = %shared.name, worker = idx, "Dropping queued task after shutdown");
            drop(job);
            continue;
        }

        if let Err(e) = tokio::spawn(job).await {
            if e.is_panic() {
                error!(pool = %shared.name, worker = idx, "Task panicked");
            }
        }
    }
    debug!(pool = %shared.name, worker = idx, "Worker exited");
}
