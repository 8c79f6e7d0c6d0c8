use crate::command::{BusOptions, CommandBus, ReadCommand, WriteCommand, WriterTask};
use crate::config::StoreConfig;
use crate::core::{Result, StoreError};
use crate::index::{IndexSyncHandle, IndexSyncPort, IndexSyncWorker, spawn_index_sync_worker};
use crate::storage::{EntityStore, StoreState};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Handle to an open chat store.
///
/// Owns the writer task and the index worker. Clone the `CommandBus` from
/// `bus()` to share the store between tasks; call `shutdown` to drain both
/// queues before exiting.
pub struct ChatStore {
    bus: CommandBus,
    writer: Option<WriterTask>,
    index_worker: Option<IndexSyncWorker>,
    config: StoreConfig,
}

impl ChatStore {
    /// Opens a store per `config`. Must be called inside a tokio runtime.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use chatstore::{ChatStore, DurabilityMode, NoopIndexSync, StoreConfig};
    /// # tokio_test::block_on(async {
    /// let dir = tempfile::TempDir::new().unwrap();
    /// let config = StoreConfig::durable(dir.path()).durability(DurabilityMode::Sync);
    ///
    /// let store = ChatStore::open(config, Arc::new(NoopIndexSync)).await.unwrap();
    /// store.checkpoint().unwrap();
    /// assert!(dir.path().join("chatstore.snapshot").exists());
    /// store.shutdown().await.unwrap();
    /// # });
    /// ```
    pub async fn open(config: StoreConfig, port: Arc<dyn IndexSyncPort>) -> Result<Self> {
        config.validate()?;
        let store = match (&config.data_dir, config.is_durable()) {
            (Some(data_dir), true) => {
                EntityStore::open(data_dir, config.durability, config.checkpoint_threshold)?
            }
            _ => EntityStore::in_memory(),
        };
        let store = Arc::new(store);

        let index_worker = spawn_index_sync_worker(port, config.index_retry.clone());
        let options = BusOptions {
            write_queue_capacity: config.write_queue_capacity,
            max_concurrent_reads: config.backpressure.max_concurrent_reads,
            read_acquire_timeout: Duration::from_millis(config.backpressure.read_acquire_timeout_ms),
        };
        let (bus, writer) = CommandBus::spawn(store, index_worker.handle(), options);

        info!(
            "Chat store opened ({}, version {})",
            match &config.data_dir {
                Some(dir) if config.is_durable() => dir.display().to_string(),
                _ => "in-memory".to_string(),
            },
            bus.store().version()
        );

        Ok(Self {
            bus,
            writer: Some(writer),
            index_worker: Some(index_worker),
            config,
        })
    }

    pub async fn in_memory(port: Arc<dyn IndexSyncPort>) -> Result<Self> {
        Self::open(StoreConfig::in_memory(), port).await
    }

    pub async fn write<C: WriteCommand>(&self, command: C) -> Result<C::Output> {
        self.bus.write(command).await
    }

    pub async fn read<C: ReadCommand>(&self, command: C) -> Result<C::Output> {
        self.bus.read(command).await
    }

    pub fn bus(&self) -> &CommandBus {
        &self.bus
    }

    pub fn index_sync(&self) -> &IndexSyncHandle {
        self.bus.index_sync()
    }

    pub fn snapshot(&self) -> Result<Arc<StoreState>> {
        self.bus.snapshot()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Snapshot to disk and truncate the WAL. No-op for in-memory stores.
    pub fn checkpoint(&self) -> Result<()> {
        self.bus.store().checkpoint()
    }

    /// Applies queued writes, delivers queued index jobs, then stops.
    pub async fn shutdown(mut self) -> Result<()> {
        self.bus.shutdown().await?;
        if let Some(writer) = self.writer.take() {
            writer.join().await?;
        }
        if self.bus.store().is_durable() {
            if let Err(err) = self.bus.store().checkpoint() {
                warn!("Final checkpoint failed: {}", err);
            }
        }
        let worker = self
            .index_worker
            .take()
            .ok_or_else(|| StoreError::BusClosed("index worker already stopped".to_string()))?;
        worker.stop().await?;
        info!("Chat store shut down at version {}", self.bus.store().version());
        Ok(())
    }
}
