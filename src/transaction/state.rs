// ============================================================================
// Transaction State Management
// ============================================================================
//
// A write command runs against a `StoreTransaction`: a copy-on-write working
// state cloned from the last committed snapshot. Mutations touch only the
// working copy and are recorded as `Change`s; post-commit side effects are
// recorded in the outbox. Rolling back is dropping the working copy.
//
// Active ──commit──> Committed
//   │
//   └──rollback──> Aborted
//
// ============================================================================

use super::Change;
use crate::core::{Entity, EntityId, Result, StoreError};
use crate::index::IndexJob;
use crate::storage::{HasTable, StoreState};
use crate::transaction::change::EntityRecord;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Result of a successful commit, consumed by the entity store.
#[derive(Debug)]
pub struct CommittedTransaction {
    pub id: TransactionId,
    pub base_version: u64,
    pub committed_at: DateTime<Utc>,
    pub state: StoreState,
    pub changes: Vec<Change>,
    pub outbox: Vec<IndexJob>,
}

/// Working copy a write command mutates.
#[derive(Debug)]
pub struct StoreTransaction {
    id: TransactionId,
    state: TransactionState,
    base_version: u64,
    now: DateTime<Utc>,
    working: StoreState,
    changes: Vec<Change>,
    outbox: Vec<IndexJob>,
}

impl StoreTransaction {
    pub(crate) fn new(working: StoreState, base_version: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Active,
            base_version,
            now,
            working,
            changes: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Transaction clock. Strictly increases from one transaction to the next.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Read view of the working state, including this transaction's own writes.
    pub fn view(&self) -> &StoreState {
        &self.working
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn outbox(&self) -> &[IndexJob] {
        &self.outbox
    }

    pub fn get<T>(&self, id: EntityId) -> Option<&T>
    where
        T: Entity,
        StoreState: HasTable<T>,
    {
        self.working.get::<T>(id)
    }

    pub fn require<T>(&self, id: EntityId) -> Result<&T>
    where
        T: Entity,
        StoreState: HasTable<T>,
    {
        self.working.require::<T>(id)
    }

    pub fn query<T, F>(&self, predicate: F) -> Vec<T>
    where
        T: Entity,
        StoreState: HasTable<T>,
        F: Fn(&T) -> bool,
    {
        self.working.query::<T, F>(predicate)
    }

    pub fn put<T>(&mut self, record: T) -> Result<()>
    where
        T: Entity + Into<EntityRecord>,
        StoreState: HasTable<T>,
    {
        self.ensure_active()?;
        HasTable::<T>::table_mut(&mut self.working).put(record.clone());
        self.changes.push(Change::Put(record.into()));
        Ok(())
    }

    /// Removes a record, returning it. Missing records are a `NotFound` error.
    pub fn delete<T>(&mut self, id: EntityId) -> Result<T>
    where
        T: Entity,
        StoreState: HasTable<T>,
    {
        self.ensure_active()?;
        let removed = HasTable::<T>::table_mut(&mut self.working)
            .delete(&id)
            .ok_or_else(|| StoreError::not_found(T::KIND, id))?;
        self.changes.push(Change::Delete { kind: T::KIND, id });
        Ok(removed)
    }

    /// Records a side effect delivered only after this transaction commits.
    pub fn emit(&mut self, job: IndexJob) -> Result<()> {
        self.ensure_active()?;
        self.outbox.push(job);
        Ok(())
    }

    pub fn commit(mut self) -> Result<CommittedTransaction> {
        self.ensure_active()?;
        self.state = TransactionState::Committed;
        Ok(CommittedTransaction {
            id: self.id,
            base_version: self.base_version,
            committed_at: self.now,
            state: self.working,
            changes: self.changes,
            outbox: self.outbox,
        })
    }

    /// Discards the working copy, its change log and its outbox.
    pub fn rollback(mut self) -> TransactionId {
        self.changes.clear();
        self.outbox.clear();
        self.state = TransactionState::Aborted;
        self.id
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(StoreError::ConstraintViolation(format!(
                "transaction {} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}
