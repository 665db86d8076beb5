//! Bounded job queue with a pending-job ledger.
//!
//! The queue is a bounded `tokio::sync::mpsc` channel. Submitting blocks when
//! it is full, so a slow disk throttles the capture loop instead of dropping
//! frames. Every accepted job is recorded in a ledger until a worker takes
//! ownership of its result; whatever is still in the ledger at shutdown is
//! reported as abandoned, so no job ever disappears without a
//! [`JobResult`](crate::job::JobResult).

use crate::error::{StorageError, StorageResult};
use crate::job::Job;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Jobs accepted but not yet claimed by a worker's result.
#[derive(Debug, Default)]
pub struct PendingLedger {
    pending: Mutex<HashMap<Uuid, u64>>,
    submitted: AtomicU64,
}

impl PendingLedger {
    fn insert(&self, id: Uuid, capture_index: u64) {
        self.pending.lock().insert(id, capture_index);
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&self, id: &Uuid) {
        if self.pending.lock().remove(id).is_some() {
            self.submitted.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Claim the right to report `id`. Returns false if it was already
    /// claimed (e.g. reported as abandoned).
    pub fn claim(&self, id: &Uuid) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Remove and return everything still pending, ordered by capture index.
    pub fn drain(&self) -> Vec<(Uuid, u64)> {
        let mut left: Vec<(Uuid, u64)> = self.pending.lock().drain().collect();
        left.sort_by_key(|(_, idx)| *idx);
        left
    }

    /// Jobs not yet claimed.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Jobs accepted since creation.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }
}

/// Producer half of the job queue. Cloneable.
#[derive(Clone)]
pub struct JobSubmitter {
    tx: mpsc::Sender<Box<dyn Job>>,
    ledger: Arc<PendingLedger>,
}

/// Consumer half of the job queue, handed to [`JobRunner::spawn`](crate::runner::JobRunner::spawn).
pub struct JobReceiver {
    pub(crate) rx: mpsc::Receiver<Box<dyn Job>>,
    pub(crate) ledger: Arc<PendingLedger>,
}

/// Create a bounded job queue.
pub fn job_queue(capacity: usize) -> (JobSubmitter, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let ledger = Arc::new(PendingLedger::default());
    (
        JobSubmitter {
            tx,
            ledger: ledger.clone(),
        },
        JobReceiver { rx, ledger },
    )
}

impl JobSubmitter {
    /// Enqueue a job, waiting for a free slot.
    ///
    /// Cancel-safe: if the returned future is dropped before a slot frees up,
    /// the job is neither queued nor recorded.
    pub async fn submit(&self, job: Box<dyn Job>) -> StorageResult<Uuid> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| StorageError::QueueClosed)?;
        let id = job.id();
        self.ledger.insert(id, job.capture_index());
        permit.send(job);
        Ok(id)
    }

    /// Enqueue a job only if a slot is free right now.
    pub fn try_submit(&self, job: Box<dyn Job>) -> StorageResult<Uuid> {
        let id = job.id();
        self.ledger.insert(id, job.capture_index());
        match self.tx.try_send(job) {
            Ok(()) => Ok(id),
            Err(err) => {
                self.ledger.cancel(&id);
                match err {
                    mpsc::error::TrySendError::Full(_) => Err(StorageError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(StorageError::QueueClosed),
                }
            }
        }
    }

    /// Free slots right now.
    pub fn available_slots(&self) -> usize {
        self.tx.capacity()
    }

    /// Shared ledger.
    pub fn ledger(&self) -> &Arc<PendingLedger> {
        &self.ledger
    }
}

impl JobReceiver {
    /// Shared ledger.
    pub fn ledger(&self) -> &Arc<PendingLedger> {
        &self.ledger
    }
}
