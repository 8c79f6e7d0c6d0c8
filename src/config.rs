use crate::core::{Result, StoreError};
use crate::storage::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry behaviour for index deliveries that fail transiently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per job, the first one included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Never retry; one attempt per job.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Exponential backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff_ms.max(1);
        let max = self.max_backoff_ms.max(base);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(base.saturating_mul(factor).min(max))
    }
}

/// Limits on concurrent readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressurePolicy {
    pub max_concurrent_reads: usize,
    /// How long a read waits for a slot before failing with `Backpressure`.
    pub read_acquire_timeout_ms: u64,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self {
            max_concurrent_reads: 64,
            read_acquire_timeout_ms: 2_000,
        }
    }
}

/// Store configuration
///
/// Without a `data_dir` the store lives in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: Option<PathBuf>,
    pub durability: DurabilityMode,
    /// WAL entries between automatic checkpoints.
    pub checkpoint_threshold: usize,
    /// Capacity of the writer queue. Callers wait when it is full.
    pub write_queue_capacity: usize,
    pub backpressure: BackpressurePolicy,
    pub index_retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            durability: DurabilityMode::Async,
            checkpoint_threshold: 1000,
            write_queue_capacity: 1024,
            backpressure: BackpressurePolicy::default(),
            index_retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Durable store rooted at `data_dir`
    pub fn durable<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::default().data_dir(data_dir)
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        self.data_dir = Some(data_dir.as_ref().to_path_buf());
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    pub fn checkpoint_threshold(mut self, entries: usize) -> Self {
        self.checkpoint_threshold = entries;
        self
    }

    pub fn write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = capacity;
        self
    }

    pub fn max_concurrent_reads(mut self, max: usize) -> Self {
        self.backpressure.max_concurrent_reads = max;
        self
    }

    pub fn read_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.backpressure.read_acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn index_retry(mut self, policy: RetryPolicy) -> Self {
        self.index_retry = policy;
        self
    }

    pub fn is_durable(&self) -> bool {
        self.data_dir.is_some() && self.durability != DurabilityMode::None
    }

    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::invalid_input(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            StoreError::invalid_input(format!("cannot parse config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_queue_capacity == 0 {
            return Err(StoreError::invalid_input("write_queue_capacity must be > 0"));
        }
        if self.backpressure.max_concurrent_reads == 0 {
            return Err(StoreError::invalid_input("max_concurrent_reads must be > 0"));
        }
        if self.index_retry.max_attempts == 0 {
            return Err(StoreError::invalid_input("index_retry.max_attempts must be > 0"));
        }
        if self.checkpoint_threshold == 0 {
            return Err(StoreError::invalid_input("checkpoint_threshold must be > 0"));
        }
        Ok(())
    }
}
