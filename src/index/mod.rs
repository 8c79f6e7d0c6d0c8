// ============================================================================
// External Retrieval Index Synchronization
// ============================================================================
//
// File attachments live in the entity store; their contents live in an
// external retrieval index. Write commands record an `IndexJob` in their
// transaction outbox and the command bus hands committed jobs to the
// `IndexSyncWorker`, which delivers them to an `IndexSyncPort` without ever
// blocking the write path.
//
// ============================================================================

pub mod http;
pub mod recording;
pub mod worker;

use crate::core::{ChunkingConfig, EntityId, FileAttachment, TokenUnit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpIndexSync;
pub use recording::{IndexCall, NoopIndexSync, RecordingIndexSync};
pub use worker::{IndexFailure, IndexSyncHandle, IndexSyncStats, IndexSyncWorker, spawn_index_sync_worker};

/// Document handed to the retrieval index when a file is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub document_id: String,
    pub url: String,
    pub table_id: String,
    pub chunking: ChunkingConfig,
    pub token_unit: TokenUnit,
}

impl IndexDocument {
    pub fn for_file(file: &FileAttachment, table_id: &str, chunking: ChunkingConfig) -> Self {
        Self {
            document_id: file.id.to_string(),
            url: file.source.clone(),
            table_id: table_id.to_string(),
            token_unit: chunking.token_unit,
            chunking,
        }
    }
}

/// Outbox entry recorded by a write command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexJob {
    Index(IndexDocument),
    Remove { document_id: String },
}

impl IndexJob {
    pub fn remove(file_id: EntityId) -> Self {
        IndexJob::Remove {
            document_id: file_id.to_string(),
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            IndexJob::Index(document) => &document.document_id,
            IndexJob::Remove { document_id } => document_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndexJob::Index(_) => "index",
            IndexJob::Remove { .. } => "remove",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexSyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Index rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

impl IndexSyncError {
    /// Client-side rejections are permanent; everything else may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexSyncError::Transport(_) | IndexSyncError::Unavailable(_) => true,
            IndexSyncError::Rejected { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Narrow interface to the external retrieval index.
#[async_trait]
pub trait IndexSyncPort: Send + Sync {
    async fn index(&self, document: IndexDocument) -> Result<(), IndexSyncError>;

    async fn remove(&self, document_id: &str) -> Result<(), IndexSyncError>;
}
