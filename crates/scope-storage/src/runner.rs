//! Fixed-size worker pool draining the job queue.
//!
//! Each pool worker is a tokio task that pulls the next job from the shared
//! receiver and runs it on the blocking thread pool, so encoding and disk I/O
//! never occupy a runtime worker thread.
//!
//! # Shutdown
//!
//! The pool finishes when every [`JobSubmitter`](crate::queue::JobSubmitter)
//! has been dropped and the queue is empty. [`JobRunner::shutdown`] waits for
//! that up to a drain timeout; after it, the shared [`JobContext`] is
//! cancelled, the workers are aborted and every job still in the ledger is
//! reported as [`JobError::Abandoned`]. Blocking threads cannot be stopped, so
//! a job past its cancellation check finishes its write in the background.

use crate::job::{Job, JobContext, JobError, JobResult};
use crate::queue::{JobReceiver, PendingLedger};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default number of pool workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Outcome of [`JobRunner::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// True if every worker exited before the timeout.
    pub drained: bool,
    /// Results emitted for jobs cut off by the timeout.
    pub abandoned: Vec<JobResult>,
}

/// Handle to a running worker pool.
pub struct JobRunner {
    workers: Vec<JoinHandle<()>>,
    ledger: Arc<PendingLedger>,
    results: mpsc::UnboundedSender<JobResult>,
    context: JobContext,
}

impl JobRunner {
    /// Start `workers` pool workers consuming `receiver`. Each finished job
    /// sends exactly one [`JobResult`] on `results`.
    pub fn spawn(
        receiver: JobReceiver,
        workers: usize,
        results: mpsc::UnboundedSender<JobResult>,
    ) -> Self {
        let ledger = receiver.ledger.clone();
        let rx = Arc::new(Mutex::new(receiver.rx));
        let context = JobContext::new();

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    ledger.clone(),
                    results.clone(),
                    context.clone(),
                ))
            })
            .collect();

        Self {
            workers,
            ledger,
            results,
            context,
        }
    }

    /// Number of pool workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait up to `drain_timeout` for the pool to finish, then abandon the rest.
    ///
    /// All submitters must be dropped first, otherwise the workers keep
    /// waiting for jobs and the drain always times out.
    pub async fn shutdown(self, drain_timeout: Duration) -> DrainReport {
        let aborts: Vec<_> = self.workers.iter().map(|h| h.abort_handle()).collect();
        let drained = tokio::time::timeout(drain_timeout, join_all(self.workers))
            .await
            .is_ok();

        if !drained {
            tracing::warn!(
                timeout_ms = drain_timeout.as_millis() as u64,
                pending = self.ledger.pending(),
                "Job pool drain timed out, abandoning remaining jobs"
            );
            self.context.cancel();
            for abort in aborts {
                abort.abort();
            }
        }

        let abandoned: Vec<JobResult> = self
            .ledger
            .drain()
            .into_iter()
            .map(|(id, capture_index)| JobResult::abandoned(id, capture_index))
            .collect();

        for result in &abandoned {
            let _ = self.results.send(result.clone());
        }

        DrainReport { drained, abandoned }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Box<dyn Job>>>>,
    ledger: Arc<PendingLedger>,
    results: mpsc::UnboundedSender<JobResult>,
    context: JobContext,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        let job_id = job.id();
        let capture_index = job.capture_index();
        let outcome = run_blocking(job, context.clone()).await;

        if let Err(err) = &outcome {
            tracing::warn!(worker_id, capture_index, error = %err, "Job failed");
        } else {
            tracing::trace!(worker_id, capture_index, "Job complete");
        }

        emit(&ledger, &results, job_id, capture_index, outcome);
    }
    tracing::debug!(worker_id, "Job worker exiting");
}

async fn run_blocking(
    job: Box<dyn Job>,
    context: JobContext,
) -> Result<crate::job::JobOutput, JobError> {
    match tokio::task::spawn_blocking(move || job.run(&context)).await {
        Ok(outcome) => outcome,
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(JobError::Panicked(message))
        }
        Err(join_err) => Err(JobError::Failed(join_err.to_string())),
    }
}

fn emit(
    ledger: &PendingLedger,
    results: &mpsc::UnboundedSender<JobResult>,
    job_id: Uuid,
    capture_index: u64,
    outcome: Result<crate::job::JobOutput, JobError>,
) {
    // Claim and send without an await in between, so an abort cannot land
    // after the claim and lose the result.
    if ledger.claim(&job_id) {
        let _ = results.send(JobResult {
            job_id,
            capture_index,
            outcome,
        });
    }
}
