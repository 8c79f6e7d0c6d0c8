//! Everything an application needs to open a store and issue commands.
//!
//! `use chatstore::prelude::*;` brings in the handle, the config builder,
//! every command type and the entity records they return.

pub use crate::command::*;
pub use crate::config::{BackpressurePolicy, RetryPolicy, StoreConfig};
pub use crate::core::*;
pub use crate::facade::ChatStore;
pub use crate::index::{
    HttpIndexSync, IndexCall, IndexDocument, IndexJob, IndexSyncError, IndexSyncPort,
    IndexSyncStats, NoopIndexSync, RecordingIndexSync,
};
pub use crate::scheduler::ScheduleState;
pub use crate::storage::DurabilityMode;
