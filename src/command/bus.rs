use super::{ReadCommand, WriteCommand};
use crate::core::{Result, StoreError};
use crate::index::IndexSyncHandle;
use crate::storage::{EntityStore, StoreState};
use crate::transaction::StoreTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Level, event, info_span};

/// Type-erased write waiting in the writer queue.
trait PendingWrite: Send {
    fn name(&self) -> &'static str;

    /// Runs the command against the transaction. False means the command
    /// failed and the transaction must be discarded.
    fn apply(&mut self, txn: &mut StoreTransaction) -> bool;

    /// Sends the final outcome to the caller.
    fn complete(self: Box<Self>, commit: Result<()>);
}

struct TypedWrite<C: WriteCommand> {
    name: &'static str,
    command: Option<C>,
    output: Option<Result<C::Output>>,
    reply: oneshot::Sender<Result<C::Output>>,
}

impl<C: WriteCommand> PendingWrite for TypedWrite<C> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&mut self, txn: &mut StoreTransaction) -> bool {
        let Some(command) = self.command.take() else {
            return false;
        };
        let output = command.apply(txn);
        let succeeded = output.is_ok();
        self.output = Some(output);
        succeeded
    }

    fn complete(self: Box<Self>, commit: Result<()>) {
        let this = *self;
        let outcome = match (commit, this.output) {
            (Err(err), _) => Err(err),
            (Ok(()), Some(output)) => output,
            (Ok(()), None) => Err(StoreError::BusClosed(format!(
                "{} was never applied",
                this.name
            ))),
        };
        // The caller may have stopped waiting; the write stands regardless.
        let _ = this.reply.send(outcome);
    }
}

enum WriterMessage {
    Apply(Box<dyn PendingWrite>),
    Shutdown(oneshot::Sender<()>),
}

/// Limits applied by the bus.
#[derive(Debug, Clone)]
pub struct BusOptions {
    pub write_queue_capacity: usize,
    pub max_concurrent_reads: usize,
    pub read_acquire_timeout: Duration,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            write_queue_capacity: 1024,
            max_concurrent_reads: 64,
            read_acquire_timeout: Duration::from_secs(2),
        }
    }
}

/// Join handle of the writer task.
pub struct WriterTask {
    join_handle: JoinHandle<()>,
}

impl WriterTask {
    pub async fn join(self) -> Result<()> {
        self.join_handle
            .await
            .map_err(|err| StoreError::BusClosed(format!("writer task join: {}", err)))
    }
}

/// Dispatches typed commands against one `EntityStore`.
///
/// Writes go through a bounded queue to a single writer task and are
/// applied in submission order. Reads run on the caller's task against the
/// latest committed snapshot, at most `max_concurrent_reads` at a time.
#[derive(Clone)]
pub struct CommandBus {
    store: Arc<EntityStore>,
    writer_tx: mpsc::Sender<WriterMessage>,
    readers: Arc<Semaphore>,
    read_acquire_timeout: Duration,
    index: IndexSyncHandle,
}

impl CommandBus {
    /// Spawns the writer task on the current tokio runtime.
    pub fn spawn(
        store: Arc<EntityStore>,
        index: IndexSyncHandle,
        options: BusOptions,
    ) -> (Self, WriterTask) {
        let (writer_tx, writer_rx) = mpsc::channel(options.write_queue_capacity.max(1));
        let join_handle = tokio::spawn(run_writer(
            Arc::clone(&store),
            index.clone(),
            writer_rx,
        ));
        let bus = Self {
            store,
            writer_tx,
            readers: Arc::new(Semaphore::new(options.max_concurrent_reads.max(1))),
            read_acquire_timeout: options.read_acquire_timeout,
            index,
        };
        (bus, WriterTask { join_handle })
    }

    /// Submits a write and waits for its commit.
    ///
    /// Once submitted, the write is applied even if this future is dropped.
    pub async fn write<C: WriteCommand>(&self, command: C) -> Result<C::Output> {
        let (reply, reply_rx) = oneshot::channel();
        let pending = TypedWrite {
            name: command.name(),
            command: Some(command),
            output: None,
            reply,
        };
        self.writer_tx
            .send(WriterMessage::Apply(Box::new(pending)))
            .await
            .map_err(|_| StoreError::BusClosed("writer task stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| StoreError::BusClosed("writer dropped the command".to_string()))?
    }

    /// Runs a read against the latest committed snapshot.
    pub async fn read<C: ReadCommand>(&self, command: C) -> Result<C::Output> {
        let timeout_ms = self.read_acquire_timeout.as_millis();
        let _permit = timeout(
            self.read_acquire_timeout,
            Arc::clone(&self.readers).acquire_owned(),
        )
        .await
        .map_err(|_| {
            StoreError::Backpressure(format!(
                "could not acquire a reader slot within {}ms",
                timeout_ms
            ))
        })?
        .map_err(|_| StoreError::BusClosed("reader semaphore closed".to_string()))?;

        let snapshot = self.store.snapshot()?;
        let span = info_span!("bus.read", command = command.name());
        let _enter = span.enter();
        let result = command.execute(&snapshot);
        if let Err(err) = &result {
            event!(Level::DEBUG, error = %err, "read command failed");
        }
        result
    }

    /// Latest committed state, for ad-hoc inspection.
    pub fn snapshot(&self) -> Result<Arc<StoreState>> {
        self.store.snapshot()
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn index_sync(&self) -> &IndexSyncHandle {
        &self.index
    }

    /// Applies every write already queued, then stops the writer task.
    pub async fn shutdown(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .writer_tx
            .send(WriterMessage::Shutdown(ack_tx))
            .await
            .is_err()
        {
            return Ok(());
        }
        ack_rx
            .await
            .map_err(|_| StoreError::BusClosed("writer stopped before acknowledging".to_string()))
    }
}

async fn run_writer(
    store: Arc<EntityStore>,
    index: IndexSyncHandle,
    mut rx: mpsc::Receiver<WriterMessage>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Apply(pending) => apply_pending(&store, &index, pending),
            WriterMessage::Shutdown(ack) => {
                rx.close();
                while let Some(rest) = rx.recv().await {
                    match rest {
                        WriterMessage::Apply(pending) => apply_pending(&store, &index, pending),
                        WriterMessage::Shutdown(other) => {
                            let _ = other.send(());
                        }
                    }
                }
                let _ = ack.send(());
                break;
            }
        }
    }
    event!(Level::DEBUG, "writer task exited");
}

fn apply_pending(store: &EntityStore, index: &IndexSyncHandle, mut pending: Box<dyn PendingWrite>) {
    let span = info_span!("bus.write", command = pending.name());
    let _enter = span.enter();

    let mut txn = match store.begin() {
        Ok(txn) => txn,
        Err(err) => {
            event!(Level::ERROR, error = %err, "could not begin transaction");
            pending.complete(Err(err));
            return;
        }
    };

    if !pending.apply(&mut txn) {
        let txn_id = txn.rollback();
        event!(Level::DEBUG, txn = %txn_id, "write command failed, rolled back");
        pending.complete(Ok(()));
        return;
    }

    match store.commit(txn) {
        Ok(outbox) => {
            for job in outbox {
                index.enqueue(job);
            }
            pending.complete(Ok(()));
        }
        Err(err) => {
            event!(Level::ERROR, error = %err, "commit failed");
            pending.complete(Err(err));
        }
    }
}
