// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every mutation a write command performs is recorded as a `Change`. The
// committed list is what the WAL stores and what recovery replays.
//
// ============================================================================

use crate::core::{
    Chat, EntityId, EntityKind, FileAttachment, Instance, Message, Model, Personality, Schedule,
    Skill,
};
use serde::{Deserialize, Serialize};

/// A full entity value, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityRecord {
    Personality(Personality),
    Chat(Chat),
    Message(Message),
    File(FileAttachment),
    Model(Model),
    Skill(Skill),
    Schedule(Schedule),
    Instance(Instance),
}

macro_rules! record_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for EntityRecord {
                fn from(value: $ty) -> Self {
                    EntityRecord::$variant(value)
                }
            }
        )+
    };
}

record_from! {
    Personality => Personality,
    Chat => Chat,
    Message => Message,
    FileAttachment => File,
    Model => Model,
    Skill => Skill,
    Schedule => Schedule,
    Instance => Instance,
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Personality(_) => EntityKind::Personality,
            EntityRecord::Chat(_) => EntityKind::Chat,
            EntityRecord::Message(_) => EntityKind::Message,
            EntityRecord::File(_) => EntityKind::File,
            EntityRecord::Model(_) => EntityKind::Model,
            EntityRecord::Skill(_) => EntityKind::Skill,
            EntityRecord::Schedule(_) => EntityKind::Schedule,
            EntityRecord::Instance(_) => EntityKind::Instance,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            EntityRecord::Personality(r) => r.id,
            EntityRecord::Chat(r) => r.id,
            EntityRecord::Message(r) => r.id,
            EntityRecord::File(r) => r.id,
            EntityRecord::Model(r) => r.id,
            EntityRecord::Skill(r) => r.id,
            EntityRecord::Schedule(r) => r.id,
            EntityRecord::Instance(r) => r.id,
        }
    }
}

/// A single mutation recorded by a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    /// Insert or replace a record.
    Put(EntityRecord),

    /// Remove a record.
    Delete { kind: EntityKind, id: EntityId },
}

impl Change {
    pub fn kind(&self) -> EntityKind {
        match self {
            Change::Put(record) => record.kind(),
            Change::Delete { kind, .. } => *kind,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        match self {
            Change::Put(record) => record.id(),
            Change::Delete { id, .. } => *id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Change::Delete { .. })
    }
}
