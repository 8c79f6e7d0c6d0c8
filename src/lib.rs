// ============================================================================
// chatstore Library
// ============================================================================
//
// Persistence layer for a local chat application: chats, messages with
// streamed multi-channel output, file attachments synced to a retrieval
// index, model catalogs, skills, automation schedules and agent instances.
//
// ============================================================================

pub mod channel;
pub mod command;
pub mod config;
pub mod core;
pub mod facade;
pub mod index;
pub mod prelude;
pub mod scheduler;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use command::{CommandBus, ReadCommand, WriteCommand};
pub use config::{BackpressurePolicy, RetryPolicy, StoreConfig};
pub use core::{EntityId, EntityKind, Result, StoreError};
pub use facade::ChatStore;
pub use index::{IndexSyncPort, NoopIndexSync, RecordingIndexSync};
pub use storage::DurabilityMode;

/// Opens an in-memory store that discards index notifications.
///
/// # Examples
///
/// ```
/// use chatstore::command::{CreatePersonality, ListPersonalities};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> chatstore::Result<()> {
/// let store = chatstore::open_in_memory().await?;
/// store
///     .write(CreatePersonality::new("Assistant", "Be concise."))
///     .await?;
///
/// let personalities = store.read(ListPersonalities).await?;
/// assert_eq!(personalities.len(), 1);
/// store.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub async fn open_in_memory() -> Result<ChatStore> {
    ChatStore::in_memory(std::sync::Arc::new(NoopIndexSync)).await
}
