// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Every write command executes inside one transaction against a
// copy-on-write working state. Commit publishes the whole working state at
// once; rollback drops it. Readers never see an intermediate state.
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::{Change, EntityRecord};
pub use state::{CommittedTransaction, StoreTransaction, TransactionId, TransactionState};
