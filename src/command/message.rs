use super::{ReadCommand, WriteCommand};
use crate::channel::{merge_channels, update_final_content, update_tool_execution};
use crate::core::{
    Chat, EntityId, Message, ProcessedOutput, Result, ToolExecutionStatus,
};
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use uuid::Uuid;

fn update_message<F>(txn: &mut StoreTransaction, message_id: EntityId, edit: F) -> Result<Message>
where
    F: FnOnce(&mut Message) -> Result<()>,
{
    let mut message = txn.require::<Message>(message_id)?.clone();
    edit(&mut message)?;
    txn.put(message.clone())?;
    Ok(message)
}

pub struct CreateMessage {
    pub chat_id: EntityId,
    pub user_input: String,
}

impl CreateMessage {
    pub fn new(chat_id: EntityId, user_input: impl Into<String>) -> Self {
        Self {
            chat_id,
            user_input: user_input.into(),
        }
    }
}

impl WriteCommand for CreateMessage {
    type Output = Message;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Message> {
        let mut chat = txn.require::<Chat>(self.chat_id)?.clone();
        let now = txn.now();
        let message = Message {
            id: Uuid::new_v4(),
            chat_id: self.chat_id,
            user_input: self.user_input,
            channels: Vec::new(),
            created_at: now,
        };
        txn.put(message.clone())?;
        chat.updated_at = now;
        txn.put(chat)?;
        Ok(message)
    }
}

pub struct GetMessage(pub EntityId);

impl ReadCommand for GetMessage {
    type Output = Message;

    fn execute(self, state: &StoreState) -> Result<Message> {
        state.require::<Message>(self.0).cloned()
    }
}

/// Chat history, oldest message first.
pub struct ListMessages(pub EntityId);

impl ReadCommand for ListMessages {
    type Output = Vec<Message>;

    fn execute(self, state: &StoreState) -> Result<Vec<Message>> {
        let chat_id = self.0;
        state.require::<Chat>(chat_id)?;
        let mut messages = state.query::<Message, _>(|message| message.chat_id == chat_id);
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }
}

/// Merges a streamed output into the message's channels.
pub struct UpdateProcessedOutput {
    pub message_id: EntityId,
    pub output: ProcessedOutput,
}

impl WriteCommand for UpdateProcessedOutput {
    type Output = Message;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Message> {
        update_message(txn, self.message_id, |message| {
            message.channels = merge_channels(&message.channels, &self.output.channels);
            Ok(())
        })
    }
}

/// Sets the final channel's content, creating the channel when missing.
pub struct UpdateFinalChannelContent {
    pub message_id: EntityId,
    pub content: String,
    pub is_complete: bool,
}

impl WriteCommand for UpdateFinalChannelContent {
    type Output = Message;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Message> {
        update_message(txn, self.message_id, |message| {
            update_final_content(&mut message.channels, self.content, self.is_complete);
            Ok(())
        })
    }
}

pub struct UpdateToolExecution {
    pub message_id: EntityId,
    pub channel_id: EntityId,
    pub status: ToolExecutionStatus,
    pub result: Option<String>,
}

impl WriteCommand for UpdateToolExecution {
    type Output = Message;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Message> {
        update_message(txn, self.message_id, |message| {
            update_tool_execution(&mut message.channels, self.channel_id, self.status, self.result)
        })
    }
}

pub struct DeleteMessage(pub EntityId);

impl WriteCommand for DeleteMessage {
    type Output = Message;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Message> {
        txn.delete::<Message>(self.0)
    }
}
