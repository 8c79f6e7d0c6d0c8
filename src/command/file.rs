use super::{ReadCommand, WriteCommand};
use crate::core::{Chat, EntityId, FileAttachment, FileState, Result, StoreError};
use crate::index::{IndexDocument, IndexJob};
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use std::fs::File;
use std::path::PathBuf;
use uuid::Uuid;

fn is_remote(source: &str) -> bool {
    let lowered = source.to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

fn local_path(source: &str) -> PathBuf {
    match source.strip_prefix("file://") {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(source),
    }
}

/// Remote sources are accepted as-is; local ones must be readable files.
fn check_source(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(StoreError::invalid_input("file source must not be empty"));
    }
    if is_remote(source) {
        return Ok(());
    }
    if source.contains("://") && !source.starts_with("file://") {
        return Err(StoreError::invalid_input(format!(
            "unsupported file source '{}'",
            source
        )));
    }
    let path = local_path(source);
    if !path.is_file() {
        return Err(StoreError::invalid_input(format!(
            "'{}' is not a readable file",
            path.display()
        )));
    }
    File::open(&path).map_err(|e| {
        StoreError::invalid_input(format!("cannot open '{}': {}", path.display(), e))
    })?;
    Ok(())
}

fn display_name(source: &str) -> String {
    let trimmed = source.trim_end_matches('/');
    let candidate = if is_remote(trimmed) {
        trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
    } else {
        local_path(trimmed)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    if candidate.is_empty() {
        source.to_string()
    } else {
        candidate
    }
}

/// Attaches a file to a chat and queues it for indexing.
pub struct CreateFile {
    pub chat_id: EntityId,
    pub source: String,
    pub name: Option<String>,
}

impl CreateFile {
    pub fn new(chat_id: EntityId, source: impl Into<String>) -> Self {
        Self {
            chat_id,
            source: source.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl WriteCommand for CreateFile {
    type Output = FileAttachment;

    fn apply(self, txn: &mut StoreTransaction) -> Result<FileAttachment> {
        let chat = txn.require::<Chat>(self.chat_id)?.clone();
        check_source(&self.source)?;

        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => display_name(&self.source),
        };
        let file = FileAttachment {
            id: Uuid::new_v4(),
            chat_id: chat.id,
            source: self.source,
            name,
            progress: 0.0,
            state: FileState::Pending,
            created_at: txn.now(),
        };
        txn.put(file.clone())?;
        txn.emit(IndexJob::Index(IndexDocument::for_file(
            &file,
            &chat.rag_table_id,
            chat.chunking,
        )))?;
        Ok(file)
    }
}

/// Records ingestion progress. Progress 1.0 without a state marks the file ready.
pub struct UpdateFileProgress {
    pub file_id: EntityId,
    pub progress: f64,
    pub state: Option<FileState>,
}

impl WriteCommand for UpdateFileProgress {
    type Output = FileAttachment;

    fn apply(self, txn: &mut StoreTransaction) -> Result<FileAttachment> {
        if !(0.0..=1.0).contains(&self.progress) {
            return Err(StoreError::invalid_input(format!(
                "progress {} is outside [0, 1]",
                self.progress
            )));
        }
        let mut file = txn.require::<FileAttachment>(self.file_id)?.clone();
        file.progress = self.progress;
        file.state = match self.state {
            Some(state) => state,
            None if self.progress >= 1.0 => FileState::Ready,
            None if self.progress > 0.0 => FileState::Indexing,
            None => file.state,
        };
        txn.put(file.clone())?;
        Ok(file)
    }
}

pub struct GetFile(pub EntityId);

impl ReadCommand for GetFile {
    type Output = FileAttachment;

    fn execute(self, state: &StoreState) -> Result<FileAttachment> {
        state.require::<FileAttachment>(self.0).cloned()
    }
}

/// Files attached to a chat, oldest first.
pub struct ListFiles(pub EntityId);

impl ReadCommand for ListFiles {
    type Output = Vec<FileAttachment>;

    fn execute(self, state: &StoreState) -> Result<Vec<FileAttachment>> {
        let chat_id = self.0;
        state.require::<Chat>(chat_id)?;
        let mut files = state.query::<FileAttachment, _>(|file| file.chat_id == chat_id);
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(files)
    }
}

/// Detaches a file and queues its removal from the index.
pub struct DeleteFile(pub EntityId);

impl WriteCommand for DeleteFile {
    type Output = FileAttachment;

    fn apply(self, txn: &mut StoreTransaction) -> Result<FileAttachment> {
        let file = txn.delete::<FileAttachment>(self.0)?;
        txn.emit(IndexJob::remove(file.id))?;
        Ok(file)
    }
}
