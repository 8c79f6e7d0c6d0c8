pub mod engine;
pub mod memory;
pub mod persistence;
pub mod table;

pub use engine::EntityStore;
pub use memory::{HasTable, StoreState};
pub use persistence::{DurabilityMode, PersistenceManager, StoreSnapshot, WalEntry};
pub use table::Table;
