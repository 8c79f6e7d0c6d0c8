use super::memory::StoreState;
use super::persistence::{DurabilityMode, PersistenceManager, WalEntry};
use crate::core::{Result, StoreError};
use crate::index::IndexJob;
use crate::transaction::StoreTransaction;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Versioned home of all entity tables.
///
/// Readers take the current `Arc<StoreState>` and keep it for as long as
/// they need; writers build a `StoreTransaction` from it and `commit` swaps
/// in the result. Commits are serialized, and a transaction whose base
/// version is stale is rejected rather than merged.
pub struct EntityStore {
    published: RwLock<Arc<StoreState>>,
    version: AtomicU64,
    clock: Mutex<DateTime<Utc>>,
    commit_lock: Mutex<()>,
    persistence: Option<Mutex<PersistenceManager>>,
}

impl EntityStore {
    pub fn in_memory() -> Self {
        Self::from_parts(StoreState::default(), 0, None)
    }

    /// Opens a durable store, recovering the last snapshot plus WAL tail.
    pub fn open<P: AsRef<Path>>(
        data_dir: P,
        durability_mode: DurabilityMode,
        checkpoint_threshold: usize,
    ) -> Result<Self> {
        if durability_mode == DurabilityMode::None {
            return Ok(Self::in_memory());
        }
        let data_dir = data_dir.as_ref();
        let mut persistence = PersistenceManager::new(data_dir, durability_mode)?;
        persistence.wal_mut().set_checkpoint_threshold(checkpoint_threshold);
        let recovered = persistence.recover()?;
        info!(
            "Recovered store from {} at version {} ({} WAL entries replayed)",
            data_dir.display(),
            recovered.version,
            recovered.replayed_entries
        );
        Ok(Self::from_parts(
            recovered.state,
            recovered.version,
            Some(Mutex::new(persistence)),
        ))
    }

    fn from_parts(
        state: StoreState,
        version: u64,
        persistence: Option<Mutex<PersistenceManager>>,
    ) -> Self {
        Self {
            published: RwLock::new(Arc::new(state)),
            version: AtomicU64::new(version),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
            commit_lock: Mutex::new(()),
            persistence,
        }
    }

    /// Latest committed state. Never reflects a partially applied write.
    pub fn snapshot(&self) -> Result<Arc<StoreState>> {
        let guard = self.published.read()?;
        Ok(Arc::clone(&guard))
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn is_durable(&self) -> bool {
        self.persistence.is_some()
    }

    /// Starts a write transaction on top of the latest committed state.
    pub fn begin(&self) -> Result<StoreTransaction> {
        let (state, version) = {
            let guard = self.published.read()?;
            (StoreState::clone(&guard), self.version())
        };
        let now = self.tick()?;
        Ok(StoreTransaction::new(state, version, now))
    }

    /// Wall clock, nudged forward so no two transactions share a timestamp.
    fn tick(&self) -> Result<DateTime<Utc>> {
        let mut last = self.clock.lock()?;
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::microseconds(1);
        }
        *last = now;
        Ok(now)
    }

    /// Publishes a transaction and returns its outbox.
    ///
    /// The WAL append happens before publication: if it fails, nothing is
    /// visible and the error is returned.
    pub fn commit(&self, txn: StoreTransaction) -> Result<Vec<IndexJob>> {
        let committed = txn.commit()?;
        let _serial = self.commit_lock.lock()?;

        let current = self.version();
        if committed.base_version != current {
            return Err(StoreError::ConstraintViolation(format!(
                "write conflict: {} started at version {} but store is at {}",
                committed.id, committed.base_version, current
            )));
        }

        if committed.changes.is_empty() {
            return Ok(committed.outbox);
        }

        let next_version = current + 1;
        if let Some(persistence) = &self.persistence {
            let mut persistence = persistence.lock()?;
            persistence.log(&WalEntry {
                txn_id: committed.id.as_u64(),
                version: next_version,
                committed_at: committed.committed_at,
                changes: committed.changes.clone(),
            })?;
        }

        let published = Arc::new(committed.state);
        {
            let mut guard = self.published.write()?;
            *guard = Arc::clone(&published);
            self.version.store(next_version, Ordering::SeqCst);
        }
        debug!(
            "Committed {} with {} change(s) at version {}",
            committed.id,
            committed.changes.len(),
            next_version
        );

        if let Some(persistence) = &self.persistence {
            let mut persistence = persistence.lock()?;
            if persistence.needs_checkpoint() {
                if let Err(err) = persistence.checkpoint(next_version, &published) {
                    warn!("Automatic checkpoint failed: {}", err);
                }
            }
        }

        Ok(committed.outbox)
    }

    /// Writes a snapshot of the current state and truncates the WAL.
    pub fn checkpoint(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let _serial = self.commit_lock.lock()?;
        let state = self.snapshot()?;
        let mut persistence = persistence.lock()?;
        persistence.checkpoint(self.version(), &state)
    }
}
