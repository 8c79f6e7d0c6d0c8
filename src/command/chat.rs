use super::model::default_language_model;
use super::{ReadCommand, WriteCommand};
use crate::core::{
    Chat, ChunkingConfig, EntityId, FileAttachment, Message, Model, ModelKind, Personality,
    Result, Schedule, StoreError,
};
use crate::index::IndexJob;
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use std::collections::BTreeSet;
use uuid::Uuid;

const DEFAULT_CHAT_TITLE: &str = "New Chat";

fn require_language_model(txn: &StoreTransaction, model_id: EntityId) -> Result<&Model> {
    let model = txn.require::<Model>(model_id)?;
    if !model.kind.is_language() {
        return Err(StoreError::invalid_input(format!(
            "model '{}' is a {} model, not a language model",
            model.name, model.kind
        )));
    }
    Ok(model)
}

fn require_image_model(txn: &StoreTransaction, model_id: EntityId) -> Result<&Model> {
    let model = txn.require::<Model>(model_id)?;
    if model.kind != ModelKind::Diffusion {
        return Err(StoreError::invalid_input(format!(
            "model '{}' is a {} model, not a diffusion model",
            model.name, model.kind
        )));
    }
    Ok(model)
}

/// Loads a chat, lets `edit` change it, stamps `updated_at` and stores it.
fn update_chat<F>(txn: &mut StoreTransaction, chat_id: EntityId, edit: F) -> Result<Chat>
where
    F: FnOnce(&mut Chat),
{
    let mut chat = txn.require::<Chat>(chat_id)?.clone();
    edit(&mut chat);
    chat.updated_at = txn.now();
    txn.put(chat.clone())?;
    Ok(chat)
}

/// What a chat deletion removed along with the chat itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatDeletion {
    pub chats: usize,
    pub messages: usize,
    pub files: usize,
    pub schedules: usize,
}

impl ChatDeletion {
    pub(crate) fn absorb(&mut self, other: ChatDeletion) {
        self.chats += other.chats;
        self.messages += other.messages;
        self.files += other.files;
        self.schedules += other.schedules;
    }
}

/// Removes a chat and everything that belongs to it. Each removed file
/// emits one index removal.
pub(crate) fn delete_chat_cascade(
    txn: &mut StoreTransaction,
    chat_id: EntityId,
) -> Result<ChatDeletion> {
    txn.require::<Chat>(chat_id)?;
    let mut deletion = ChatDeletion {
        chats: 1,
        ..ChatDeletion::default()
    };

    for message in txn.query::<Message, _>(|message| message.chat_id == chat_id) {
        txn.delete::<Message>(message.id)?;
        deletion.messages += 1;
    }
    for file in txn.query::<FileAttachment, _>(|file| file.chat_id == chat_id) {
        txn.delete::<FileAttachment>(file.id)?;
        txn.emit(IndexJob::remove(file.id))?;
        deletion.files += 1;
    }
    for schedule in txn.query::<Schedule, _>(|schedule| schedule.chat_id == Some(chat_id)) {
        txn.delete::<Schedule>(schedule.id)?;
        deletion.schedules += 1;
    }
    txn.delete::<Chat>(chat_id)?;
    Ok(deletion)
}

// ----------------------------------------------------------------------------
// Chat lifecycle
// ----------------------------------------------------------------------------

/// Opens a chat. Without an explicit language model the default one is used.
#[derive(Debug, Clone)]
pub struct CreateChat {
    pub personality_id: EntityId,
    pub title: String,
    pub language_model_id: Option<EntityId>,
    pub image_model_id: Option<EntityId>,
    pub enabled_tools: BTreeSet<String>,
    pub chunking: Option<ChunkingConfig>,
}

impl CreateChat {
    pub fn new(personality_id: EntityId, title: impl Into<String>) -> Self {
        Self {
            personality_id,
            title: title.into(),
            language_model_id: None,
            image_model_id: None,
            enabled_tools: BTreeSet::new(),
            chunking: None,
        }
    }

    pub fn language_model(mut self, model_id: EntityId) -> Self {
        self.language_model_id = Some(model_id);
        self
    }

    pub fn image_model(mut self, model_id: EntityId) -> Self {
        self.image_model_id = Some(model_id);
        self
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = Some(chunking);
        self
    }
}

impl WriteCommand for CreateChat {
    type Output = Chat;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Chat> {
        txn.require::<Personality>(self.personality_id)?;

        let language_model_id = match self.language_model_id {
            Some(model_id) => require_language_model(txn, model_id)?.id,
            None => {
                default_language_model(txn.view())
                    .ok_or_else(|| StoreError::invalid_input("no language model is registered"))?
                    .id
            }
        };
        if let Some(model_id) = self.image_model_id {
            require_image_model(txn, model_id)?;
        }

        let title = self.title.trim();
        let id = Uuid::new_v4();
        let now = txn.now();
        let chat = Chat {
            id,
            title: if title.is_empty() {
                DEFAULT_CHAT_TITLE.to_string()
            } else {
                title.to_string()
            },
            personality_id: self.personality_id,
            language_model_id,
            image_model_id: self.image_model_id,
            fallback_model_ids: Vec::new(),
            enabled_tools: self.enabled_tools,
            rag_table_id: Chat::rag_table_for(id),
            chunking: self.chunking.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        txn.put(chat.clone())?;
        Ok(chat)
    }
}

pub struct GetChat(pub EntityId);

impl ReadCommand for GetChat {
    type Output = Chat;

    fn execute(self, state: &StoreState) -> Result<Chat> {
        state.require::<Chat>(self.0).cloned()
    }
}

/// All chats, most recently created first.
pub struct ListChats;

impl ReadCommand for ListChats {
    type Output = Vec<Chat>;

    fn execute(self, state: &StoreState) -> Result<Vec<Chat>> {
        let mut chats = state.all::<Chat>();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(chats)
    }
}

pub struct RenameChat {
    pub chat_id: EntityId,
    pub title: String,
}

impl WriteCommand for RenameChat {
    type Output = Chat;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Chat> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::invalid_input("chat title must not be empty"));
        }
        update_chat(txn, self.chat_id, |chat| chat.title = title)
    }
}

/// Switches the chat's primary language model.
pub struct SetChatModel {
    pub chat_id: EntityId,
    pub model_id: EntityId,
}

impl WriteCommand for SetChatModel {
    type Output = Chat;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Chat> {
        txn.require::<Chat>(self.chat_id)?;
        let model_id = require_language_model(txn, self.model_id)?.id;
        update_chat(txn, self.chat_id, |chat| chat.language_model_id = model_id)
    }
}

pub struct SetImageModel {
    pub chat_id: EntityId,
    pub model_id: Option<EntityId>,
}

impl WriteCommand for SetImageModel {
    type Output = Chat;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Chat> {
        txn.require::<Chat>(self.chat_id)?;
        if let Some(model_id) = self.model_id {
            require_image_model(txn, model_id)?;
        }
        update_chat(txn, self.chat_id, |chat| chat.image_model_id = self.model_id)
    }
}

pub struct SetEnabledTools {
    pub chat_id: EntityId,
    pub tools: BTreeSet<String>,
}

impl WriteCommand for SetEnabledTools {
    type Output = Chat;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Chat> {
        update_chat(txn, self.chat_id, |chat| chat.enabled_tools = self.tools)
    }
}

/// Deletes a chat with its messages, files and chat-bound schedules.
pub struct DeleteChat(pub EntityId);

impl WriteCommand for DeleteChat {
    type Output = ChatDeletion;

    fn apply(self, txn: &mut StoreTransaction) -> Result<ChatDeletion> {
        delete_chat_cascade(txn, self.0)
    }
}

// ----------------------------------------------------------------------------
// Fallback models
// ----------------------------------------------------------------------------

/// Appends a fallback model unless it is already listed.
pub struct AddFallbackModel {
    pub chat_id: EntityId,
    pub model_id: EntityId,
}

impl WriteCommand for AddFallbackModel {
    type Output = Vec<EntityId>;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Vec<EntityId>> {
        let chat = txn.require::<Chat>(self.chat_id)?;
        if chat.fallback_model_ids.contains(&self.model_id) {
            return Ok(chat.fallback_model_ids.clone());
        }
        txn.require::<Model>(self.model_id)?;
        let chat = update_chat(txn, self.chat_id, |chat| {
            chat.fallback_model_ids.push(self.model_id)
        })?;
        Ok(chat.fallback_model_ids)
    }
}

/// Removes a fallback model if listed; a no-op otherwise.
pub struct RemoveFallbackModel {
    pub chat_id: EntityId,
    pub model_id: EntityId,
}

impl WriteCommand for RemoveFallbackModel {
    type Output = Vec<EntityId>;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Vec<EntityId>> {
        let chat = txn.require::<Chat>(self.chat_id)?;
        if !chat.fallback_model_ids.contains(&self.model_id) {
            return Ok(chat.fallback_model_ids.clone());
        }
        let chat = update_chat(txn, self.chat_id, |chat| {
            chat.fallback_model_ids.retain(|id| *id != self.model_id)
        })?;
        Ok(chat.fallback_model_ids)
    }
}

/// Replaces the fallback list as given. Duplicates are kept.
pub struct SetFallbackModels {
    pub chat_id: EntityId,
    pub model_ids: Vec<EntityId>,
}

impl WriteCommand for SetFallbackModels {
    type Output = Vec<EntityId>;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Vec<EntityId>> {
        txn.require::<Chat>(self.chat_id)?;
        for model_id in &self.model_ids {
            txn.require::<Model>(*model_id)?;
        }
        let chat = update_chat(txn, self.chat_id, |chat| {
            chat.fallback_model_ids = self.model_ids
        })?;
        Ok(chat.fallback_model_ids)
    }
}

pub struct GetFallbackModels(pub EntityId);

impl ReadCommand for GetFallbackModels {
    type Output = Vec<EntityId>;

    fn execute(self, state: &StoreState) -> Result<Vec<EntityId>> {
        Ok(state.require::<Chat>(self.0)?.fallback_model_ids.clone())
    }
}
