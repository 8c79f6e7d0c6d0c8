use super::Table;
use crate::core::{
    Chat, Entity, EntityId, EntityKind, FileAttachment, Instance, Message, Model, Personality,
    Result, Schedule, Skill, StoreError,
};
use crate::transaction::{Change, EntityRecord};
use serde::{Deserialize, Serialize};

/// Access to the table holding records of type `T`.
pub trait HasTable<T: Entity> {
    fn table(&self) -> &Table<T>;
    fn table_mut(&mut self) -> &mut Table<T>;
}

/// Every table of the store, as one immutable value.
///
/// Published snapshots are `Arc<StoreState>`; a write transaction clones the
/// latest one (cheap, tables are persistent maps) and commits by publishing
/// the modified clone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    personalities: Table<Personality>,
    chats: Table<Chat>,
    messages: Table<Message>,
    files: Table<FileAttachment>,
    models: Table<Model>,
    skills: Table<Skill>,
    schedules: Table<Schedule>,
    instances: Table<Instance>,
}

macro_rules! has_table {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(
            impl HasTable<$ty> for StoreState {
                fn table(&self) -> &Table<$ty> {
                    &self.$field
                }

                fn table_mut(&mut self) -> &mut Table<$ty> {
                    &mut self.$field
                }
            }
        )+
    };
}

has_table! {
    Personality => personalities,
    Chat => chats,
    Message => messages,
    FileAttachment => files,
    Model => models,
    Skill => skills,
    Schedule => schedules,
    Instance => instances,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T>(&self, id: EntityId) -> Option<&T>
    where
        T: Entity,
        Self: HasTable<T>,
    {
        HasTable::<T>::table(self).get(&id)
    }

    /// Like `get`, but a missing record is a `NotFound` error.
    pub fn require<T>(&self, id: EntityId) -> Result<&T>
    where
        T: Entity,
        Self: HasTable<T>,
    {
        self.get::<T>(id)
            .ok_or_else(|| StoreError::not_found(T::KIND, id))
    }

    pub fn query<T, F>(&self, predicate: F) -> Vec<T>
    where
        T: Entity,
        Self: HasTable<T>,
        F: Fn(&T) -> bool,
    {
        HasTable::<T>::table(self).query(predicate)
    }

    pub fn all<T>(&self) -> Vec<T>
    where
        T: Entity,
        Self: HasTable<T>,
    {
        HasTable::<T>::table(self).values().cloned().collect()
    }

    pub fn count<T>(&self) -> usize
    where
        T: Entity,
        Self: HasTable<T>,
    {
        HasTable::<T>::table(self).len()
    }

    pub fn count_where<T, F>(&self, predicate: F) -> usize
    where
        T: Entity,
        Self: HasTable<T>,
        F: Fn(&T) -> bool,
    {
        HasTable::<T>::table(self).count_where(predicate)
    }

    /// Replays one committed change. Used by recovery.
    pub fn apply_change(&mut self, change: Change) {
        match change {
            Change::Put(record) => self.put_record(record),
            Change::Delete { kind, id } => self.delete_record(kind, id),
        }
    }

    fn put_record(&mut self, record: EntityRecord) {
        match record {
            EntityRecord::Personality(r) => {
                self.personalities.put(r);
            }
            EntityRecord::Chat(r) => {
                self.chats.put(r);
            }
            EntityRecord::Message(r) => {
                self.messages.put(r);
            }
            EntityRecord::File(r) => {
                self.files.put(r);
            }
            EntityRecord::Model(r) => {
                self.models.put(r);
            }
            EntityRecord::Skill(r) => {
                self.skills.put(r);
            }
            EntityRecord::Schedule(r) => {
                self.schedules.put(r);
            }
            EntityRecord::Instance(r) => {
                self.instances.put(r);
            }
        }
    }

    fn delete_record(&mut self, kind: EntityKind, id: EntityId) {
        match kind {
            EntityKind::Personality => {
                self.personalities.delete(&id);
            }
            EntityKind::Chat => {
                self.chats.delete(&id);
            }
            EntityKind::Message => {
                self.messages.delete(&id);
            }
            EntityKind::File => {
                self.files.delete(&id);
            }
            EntityKind::Model => {
                self.models.delete(&id);
            }
            EntityKind::Skill => {
                self.skills.delete(&id);
            }
            EntityKind::Schedule => {
                self.schedules.delete(&id);
            }
            EntityKind::Instance => {
                self.instances.delete(&id);
            }
            // Channels live inside messages and are never stored alone.
            EntityKind::Channel => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_apply_change_put_then_delete() {
        let mut state = StoreState::new();
        let personality = Personality {
            id: Uuid::new_v4(),
            name: "tutor".to_string(),
            system_instruction: "Be patient.".to_string(),
            created_at: Utc::now(),
        };
        state.apply_change(Change::Put(personality.clone().into()));
        assert_eq!(state.require::<Personality>(personality.id).unwrap(), &personality);

        state.apply_change(Change::Delete {
            kind: EntityKind::Personality,
            id: personality.id,
        });
        assert_eq!(state.count::<Personality>(), 0);
    }

    #[test]
    fn test_require_reports_kind() {
        let state = StoreState::new();
        let err = state.require::<Chat>(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.missing_kind(), Some(EntityKind::Chat));
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut state = StoreState::new();
        let snapshot = state.clone();
        HasTable::<Personality>::table_mut(&mut state).put(Personality {
            id: Uuid::new_v4(),
            name: "coach".to_string(),
            system_instruction: String::new(),
            created_at: Utc::now(),
        });
        assert_eq!(state.count::<Personality>(), 1);
        assert_eq!(snapshot.count::<Personality>(), 0);
    }
}
