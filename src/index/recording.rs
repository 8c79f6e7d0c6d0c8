use super::{IndexDocument, IndexSyncError, IndexSyncPort};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One successful call observed by `RecordingIndexSync`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
    Index(IndexDocument),
    Remove(String),
}

impl IndexCall {
    pub fn document_id(&self) -> &str {
        match self {
            IndexCall::Index(document) => &document.document_id,
            IndexCall::Remove(document_id) => document_id,
        }
    }
}

#[derive(Default)]
struct Recording {
    calls: Vec<IndexCall>,
    attempts: usize,
    injected: VecDeque<IndexSyncError>,
}

/// In-memory port that records every call.
///
/// Failures queued with `fail_next` are returned, in order, by the next
/// attempts; a failed attempt is counted but not recorded as a call.
#[derive(Default)]
pub struct RecordingIndexSync {
    recording: Mutex<Recording>,
    delay: Option<Duration>,
}

impl RecordingIndexSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            recording: Mutex::default(),
            delay: Some(delay),
        }
    }

    pub fn fail_next(&self, error: IndexSyncError) {
        self.lock().injected.push_back(error);
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.lock().calls.clone()
    }

    pub fn indexed(&self) -> Vec<IndexDocument> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                IndexCall::Index(document) => Some(document.clone()),
                IndexCall::Remove(_) => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                IndexCall::Remove(document_id) => Some(document_id.clone()),
                IndexCall::Index(_) => None,
            })
            .collect()
    }

    /// Attempts made, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        match self.recording.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn record(&self, call: IndexCall) -> Result<(), IndexSyncError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut recording = self.lock();
        recording.attempts += 1;
        if let Some(error) = recording.injected.pop_front() {
            return Err(error);
        }
        recording.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl IndexSyncPort for RecordingIndexSync {
    async fn index(&self, document: IndexDocument) -> Result<(), IndexSyncError> {
        self.record(IndexCall::Index(document)).await
    }

    async fn remove(&self, document_id: &str) -> Result<(), IndexSyncError> {
        self.record(IndexCall::Remove(document_id.to_string())).await
    }
}

/// Port that accepts everything and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndexSync;

#[async_trait]
impl IndexSyncPort for NoopIndexSync {
    async fn index(&self, _document: IndexDocument) -> Result<(), IndexSyncError> {
        Ok(())
    }

    async fn remove(&self, _document_id: &str) -> Result<(), IndexSyncError> {
        Ok(())
    }
}
