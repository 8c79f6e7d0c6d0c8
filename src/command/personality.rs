use super::chat::{ChatDeletion, delete_chat_cascade};
use super::{ReadCommand, WriteCommand};
use crate::core::{Chat, EntityId, Personality, Result, StoreError};
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use uuid::Uuid;

pub struct CreatePersonality {
    pub name: String,
    pub system_instruction: String,
}

impl CreatePersonality {
    pub fn new(name: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_instruction: system_instruction.into(),
        }
    }
}

impl WriteCommand for CreatePersonality {
    type Output = Personality;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Personality> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(StoreError::invalid_input("personality name must not be empty"));
        }
        let personality = Personality {
            id: Uuid::new_v4(),
            name: name.to_string(),
            system_instruction: self.system_instruction,
            created_at: txn.now(),
        };
        txn.put(personality.clone())?;
        Ok(personality)
    }
}

pub struct GetPersonality(pub EntityId);

impl ReadCommand for GetPersonality {
    type Output = Personality;

    fn execute(self, state: &StoreState) -> Result<Personality> {
        state.require::<Personality>(self.0).cloned()
    }
}

/// Personalities sorted by name.
pub struct ListPersonalities;

impl ReadCommand for ListPersonalities {
    type Output = Vec<Personality>;

    fn execute(self, state: &StoreState) -> Result<Vec<Personality>> {
        let mut personalities = state.all::<Personality>();
        personalities.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(personalities)
    }
}

/// Deletes a personality together with every chat that uses it.
pub struct DeletePersonality(pub EntityId);

impl WriteCommand for DeletePersonality {
    type Output = ChatDeletion;

    fn apply(self, txn: &mut StoreTransaction) -> Result<ChatDeletion> {
        let personality_id = self.0;
        txn.require::<Personality>(personality_id)?;

        let chats = txn.query::<Chat, _>(|chat| chat.personality_id == personality_id);
        let mut total = ChatDeletion::default();
        for chat in chats {
            total.absorb(delete_chat_cascade(txn, chat.id)?);
        }
        txn.delete::<Personality>(personality_id)?;
        Ok(total)
    }
}
