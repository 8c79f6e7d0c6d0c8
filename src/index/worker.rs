use super::{IndexJob, IndexSyncError, IndexSyncPort};
use crate::config::RetryPolicy;
use crate::core::{Result, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Instrument, Level, event, info_span};

enum IndexMessage {
    Job(IndexJob),
    Flush(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// Delivery counters since the worker started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSyncStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub retried: u64,
    /// Jobs that could not be queued because the worker had already stopped.
    pub dropped: u64,
}

impl IndexSyncStats {
    /// Jobs queued but not yet delivered or failed.
    pub fn pending(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.delivered)
            .saturating_sub(self.failed)
            .saturating_sub(self.dropped)
    }
}

/// A job that exhausted its attempts or was rejected outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFailure {
    pub job: IndexJob,
    pub error: IndexSyncError,
    pub attempts: u32,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct Shared {
    counters: Counters,
    failures: Mutex<Vec<IndexFailure>>,
}

impl Shared {
    fn record_failure(&self, failure: IndexFailure) {
        self.counters.failed.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock() {
            Ok(mut failures) => failures.push(failure),
            Err(poisoned) => poisoned.into_inner().push(failure),
        }
    }
}

/// Cloneable sender side of the index worker.
#[derive(Clone)]
pub struct IndexSyncHandle {
    tx: mpsc::UnboundedSender<IndexMessage>,
    shared: Arc<Shared>,
}

impl IndexSyncHandle {
    /// Queues a job without waiting. Returns false if the worker is gone.
    pub fn enqueue(&self, job: IndexJob) -> bool {
        self.shared.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(IndexMessage::Job(job)) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                self.shared.counters.dropped.fetch_add(1, Ordering::SeqCst);
                if let IndexMessage::Job(job) = message {
                    log::warn!(
                        "Index worker stopped; dropping {} job for document {}",
                        job.label(),
                        job.document_id()
                    );
                }
                false
            }
        }
    }

    /// Waits until every job queued before this call has been attempted.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(IndexMessage::Flush(ack_tx))
            .map_err(|_| StoreError::BusClosed("index worker stopped".to_string()))?;
        ack_rx
            .await
            .map_err(|_| StoreError::BusClosed("index worker stopped".to_string()))
    }

    pub fn stats(&self) -> IndexSyncStats {
        let counters = &self.shared.counters;
        IndexSyncStats {
            enqueued: counters.enqueued.load(Ordering::SeqCst),
            delivered: counters.delivered.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            retried: counters.retried.load(Ordering::SeqCst),
            dropped: counters.dropped.load(Ordering::SeqCst),
        }
    }

    /// Drains the recorded failures.
    pub fn take_failures(&self) -> Vec<IndexFailure> {
        match self.shared.failures.lock() {
            Ok(mut failures) => std::mem::take(&mut *failures),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Background task delivering index jobs to an `IndexSyncPort`, one at a time.
///
/// The task exits after `stop`, or once every handle has been dropped and
/// the queue is drained.
pub struct IndexSyncWorker {
    handle: IndexSyncHandle,
    join_handle: Option<JoinHandle<()>>,
}

impl IndexSyncWorker {
    pub fn handle(&self) -> IndexSyncHandle {
        self.handle.clone()
    }

    /// Delivers everything already queued, then stops the task.
    pub async fn stop(mut self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.handle.tx.send(IndexMessage::Stop(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| StoreError::BusClosed(format!("index worker join: {}", err)))?;
        }
        Ok(())
    }
}

/// Spawns the index worker on the current tokio runtime.
pub fn spawn_index_sync_worker(
    port: Arc<dyn IndexSyncPort>,
    retry: RetryPolicy,
) -> IndexSyncWorker {
    let (tx, mut rx) = mpsc::unbounded_channel::<IndexMessage>();
    let shared = Arc::new(Shared::default());
    let shared_for_worker = Arc::clone(&shared);

    let join_handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                IndexMessage::Job(job) => {
                    deliver(port.as_ref(), &retry, &shared_for_worker, job).await;
                }
                IndexMessage::Flush(ack) => {
                    let _ = ack.send(());
                }
                IndexMessage::Stop(ack) => {
                    rx.close();
                    while let Some(rest) = rx.recv().await {
                        match rest {
                            IndexMessage::Job(job) => {
                                deliver(port.as_ref(), &retry, &shared_for_worker, job).await;
                            }
                            IndexMessage::Flush(ack) | IndexMessage::Stop(ack) => {
                                let _ = ack.send(());
                            }
                        }
                    }
                    let _ = ack.send(());
                    break;
                }
            }
        }
        event!(Level::DEBUG, "index worker exited");
    });

    IndexSyncWorker {
        handle: IndexSyncHandle { tx, shared },
        join_handle: Some(join_handle),
    }
}

async fn deliver(port: &dyn IndexSyncPort, retry: &RetryPolicy, shared: &Shared, job: IndexJob) {
    let span = info_span!(
        "index.deliver",
        job = job.label(),
        document_id = %job.document_id()
    );
    async {
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match &job {
                IndexJob::Index(document) => port.index(document.clone()).await,
                IndexJob::Remove { document_id } => port.remove(document_id).await,
            };
            match result {
                Ok(()) => {
                    shared.counters.delivered.fetch_add(1, Ordering::SeqCst);
                    event!(Level::DEBUG, attempt, "index job delivered");
                    return;
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    shared.counters.retried.fetch_add(1, Ordering::SeqCst);
                    event!(Level::WARN, attempt, error = %err, "index job failed, retrying");
                    sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    event!(Level::ERROR, attempt, error = %err, "index job failed");
                    shared.record_failure(IndexFailure {
                        job: job.clone(),
                        error: err,
                        attempts: attempt,
                    });
                    return;
                }
            }
        }
    }
    .instrument(span)
    .await
}
