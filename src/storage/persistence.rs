//! Write-ahead log and snapshot files for durable stores.

use crate::core::{Result, StoreError};
use crate::storage::memory::StoreState;
use crate::transaction::Change;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const WAL_FILE_NAME: &str = "chatstore.wal";
const SNAPSHOT_FILE_NAME: &str = "chatstore.snapshot";
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

fn persistence_error(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::PersistenceError(format!("{}: {}", context, err))
}

// ============================================================================
// WAL Entry Types
// ============================================================================

/// One committed write transaction. Replay applies `changes` in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub txn_id: u64,
    pub version: u64,
    pub committed_at: DateTime<Utc>,
    pub changes: Vec<Change>,
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub state: StoreState,
}

impl StoreSnapshot {
    pub fn new(version: u64, state: StoreState) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            version,
            created_at: Utc::now(),
            state,
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DurabilityMode {
    /// fsync the WAL on every commit.
    Sync,
    /// Flush to the OS on every commit, no fsync.
    #[default]
    Async,
    /// Keep nothing on disk.
    None,
}

fn write_frame(file: &mut BufWriter<File>, frame: &[u8], sync: bool) -> Result<()> {
    file.write_all(frame)
        .map_err(|e| persistence_error("Failed to write WAL", e))?;
    file.flush()
        .map_err(|e| persistence_error("Failed to flush WAL", e))?;
    if sync {
        file.get_mut()
            .sync_all()
            .map_err(|e| persistence_error("Failed to sync WAL", e))?;
    }
    Ok(())
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| persistence_error("Failed to create WAL directory", e))?;
        }

        let wal_file = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&wal_path)
                .map_err(|e| persistence_error("Failed to open WAL file", e))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    /// Appends one length-prefixed entry. A failed append leaves the file at
    /// its previous length, so a later append never lands behind torn bytes.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let serialized = rmp_serde::to_vec(entry)
            .map_err(|e| persistence_error("Failed to serialize WAL entry", e))?;
        let mut frame = Vec::with_capacity(4 + serialized.len());
        frame.extend_from_slice(&(serialized.len() as u32).to_le_bytes());
        frame.extend_from_slice(&serialized);

        let sync = self.durability_mode == DurabilityMode::Sync;
        let file = self
            .wal_file
            .as_mut()
            .ok_or_else(|| StoreError::PersistenceError("WAL file not initialized".to_string()))?;
        let start = file
            .get_ref()
            .metadata()
            .map_err(|e| persistence_error("Failed to stat WAL", e))?
            .len();
        if let Err(err) = write_frame(file, &frame, sync) {
            if let Err(rollback_err) = self.rollback_to(start) {
                warn!(
                    "Could not truncate {} after failed append: {}",
                    self.wal_path.display(),
                    rollback_err
                );
            }
            return Err(err);
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    /// Drops buffered bytes and cuts the file back to `len`.
    fn rollback_to(&mut self, len: u64) -> Result<()> {
        let Some(writer) = self.wal_file.take() else {
            return Ok(());
        };
        let (file, _unwritten) = writer.into_parts();
        let truncated = file
            .set_len(len)
            .map_err(|e| persistence_error("Failed to truncate WAL", e));
        self.wal_file = Some(BufWriter::new(file));
        truncated
    }

    /// Reads every complete entry. A torn trailing entry (crash mid-append)
    /// is ignored; it was never acknowledged to a caller.
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        if !self.wal_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.wal_path)
            .map_err(|e| persistence_error("Failed to open WAL for reading", e))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(persistence_error("Failed to read WAL entry length", e)),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    warn!(
                        "Ignoring torn WAL entry at the end of {}",
                        self.wal_path.display()
                    );
                    break;
                }
                Err(e) => return Err(persistence_error("Failed to read WAL entry data", e)),
            }
            let entry: WalEntry = rmp_serde::from_slice(&data)
                .map_err(|e| persistence_error("Failed to deserialize WAL entry", e))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.wal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| persistence_error("Failed to truncate WAL", e))?;
        self.wal_file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Writes through a temp file in the same directory, then renames over
    /// the previous snapshot.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let parent = self
            .snapshot_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .map_err(|e| persistence_error("Failed to create snapshot directory", e))?;

        let serialized = rmp_serde::to_vec(snapshot)
            .map_err(|e| persistence_error("Failed to serialize snapshot", e))?;
        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| persistence_error("Failed to create temp file", e))?;
        temp.write_all(&serialized)
            .map_err(|e| persistence_error("Failed to write snapshot", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| persistence_error("Failed to sync snapshot", e))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| persistence_error("Failed to rename snapshot", e.error))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| persistence_error("Failed to open snapshot", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| persistence_error("Failed to read snapshot", e))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data)
            .map_err(|e| persistence_error("Failed to deserialize snapshot", e))?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::PersistenceError(format!(
                "Unsupported snapshot format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

/// State recovered from disk when a durable store opens.
#[derive(Debug, Default)]
pub struct RecoveredState {
    pub state: StoreState,
    pub version: u64,
    pub replayed_entries: usize,
}

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let wal = WalManager::new(data_dir.join(WAL_FILE_NAME), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(SNAPSHOT_FILE_NAME));
        Ok(Self {
            wal,
            snapshot,
            durability_mode,
        })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    pub fn checkpoint(&mut self, version: u64, state: &StoreState) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let snapshot = StoreSnapshot::new(version, state.clone());
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        info!("Checkpoint written at store version {}", version);
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    /// Loads the latest snapshot and replays the WAL written after it.
    pub fn recover(&self) -> Result<RecoveredState> {
        let (mut state, mut version) = match self.snapshot.load()? {
            Some(snapshot) => (snapshot.state, snapshot.version),
            None => (StoreState::default(), 0),
        };

        let entries = self.wal.read_all()?;
        let mut replayed_entries = 0;
        for entry in entries {
            // Entries already folded into the snapshot are skipped.
            if entry.version <= version {
                continue;
            }
            for change in entry.changes {
                state.apply_change(change);
            }
            version = entry.version;
            replayed_entries += 1;
        }

        Ok(RecoveredState {
            state,
            version,
            replayed_entries,
        })
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut WalManager {
        &mut self.wal
    }

    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Personality;
    use crate::transaction::EntityRecord;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn personality_change(name: &str) -> (Personality, Change) {
        let personality = Personality {
            id: Uuid::new_v4(),
            name: name.to_string(),
            system_instruction: String::new(),
            created_at: Utc::now(),
        };
        let change = Change::Put(EntityRecord::from(personality.clone()));
        (personality, change)
    }

    #[test]
    fn test_wal_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal =
            WalManager::new(temp_dir.path().join("test.wal"), DurabilityMode::Sync).unwrap();
        let (_, change) = personality_change("tutor");
        for version in 1..=3 {
            wal.append(&WalEntry {
                txn_id: version,
                version,
                committed_at: Utc::now(),
                changes: vec![change.clone()],
            })
            .unwrap();
        }
        let entries = wal.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].version, 3);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        let (_, change) = personality_change("tutor");
        wal.append(&WalEntry {
            txn_id: 1,
            version: 1,
            committed_at: Utc::now(),
            changes: vec![change],
        })
        .unwrap();

        let mut raw = OpenOptions::new().append(true).open(&wal_path).unwrap();
        raw.write_all(&64u32.to_le_bytes()).unwrap();
        raw.write_all(&[1, 2, 3]).unwrap();

        assert_eq!(wal.read_all().unwrap().len(), 1);
    }

    fn entry(version: u64, change: Change) -> WalEntry {
        WalEntry {
            txn_id: version,
            version,
            committed_at: Utc::now(),
            changes: vec![change],
        }
    }

    #[test]
    fn test_rollback_drops_partial_frame_before_next_append() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        let (_, change) = personality_change("tutor");
        wal.append(&entry(1, change.clone())).unwrap();
        let start = fs::metadata(&wal_path).unwrap().len();

        let mut raw = OpenOptions::new().append(true).open(&wal_path).unwrap();
        raw.write_all(&64u32.to_le_bytes()).unwrap();
        raw.write_all(&[1, 2, 3]).unwrap();
        wal.rollback_to(start).unwrap();
        assert_eq!(fs::metadata(&wal_path).unwrap().len(), start);

        wal.append(&entry(2, change)).unwrap();
        let versions: Vec<_> = wal.read_all().unwrap().iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn test_failed_append_is_not_counted_and_keeps_writer() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        let (_, change) = personality_change("tutor");
        wal.append(&entry(1, change.clone())).unwrap();

        let read_only = File::open(&wal_path).unwrap();
        wal.wal_file = Some(BufWriter::new(read_only));
        let err = wal.append(&entry(2, change)).unwrap_err();
        assert!(matches!(err, StoreError::PersistenceError(_)));
        assert_eq!(wal.entries_since_checkpoint(), 1);
        assert!(wal.wal_file.is_some());
        assert_eq!(wal.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_checkpoint_clears_wal_and_recovery_replays_tail() {
        let temp_dir = TempDir::new().unwrap();
        let mut persistence =
            PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let (first, first_change) = personality_change("tutor");
        let mut state = StoreState::default();
        state.apply_change(first_change.clone());
        persistence
            .log(&WalEntry {
                txn_id: 1,
                version: 1,
                committed_at: Utc::now(),
                changes: vec![first_change],
            })
            .unwrap();
        persistence.checkpoint(1, &state).unwrap();
        assert_eq!(persistence.wal().entries_since_checkpoint(), 0);

        let (second, second_change) = personality_change("coach");
        persistence
            .log(&WalEntry {
                txn_id: 2,
                version: 2,
                committed_at: Utc::now(),
                changes: vec![second_change],
            })
            .unwrap();

        let recovered = persistence.recover().unwrap();
        assert_eq!(recovered.version, 2);
        assert_eq!(recovered.replayed_entries, 1);
        assert!(recovered.state.get::<Personality>(first.id).is_some());
        assert!(recovered.state.get::<Personality>(second.id).is_some());
    }
}
