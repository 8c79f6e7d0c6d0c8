use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier shared by every stored entity.
pub type EntityId = Uuid;

/// Kind tag carried by `NotFound` errors and change records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Chat,
    Message,
    Channel,
    File,
    Model,
    Personality,
    Skill,
    Schedule,
    Instance,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Chat => "chat",
            EntityKind::Message => "message",
            EntityKind::Channel => "channel",
            EntityKind::File => "file",
            EntityKind::Model => "model",
            EntityKind::Personality => "personality",
            EntityKind::Skill => "skill",
            EntityKind::Schedule => "schedule",
            EntityKind::Instance => "instance",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => write!(f, "{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => Ok(()),
        }
    }
}

/// A record the entity store can hold.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_is_capitalized() {
        assert_eq!(EntityKind::Chat.to_string(), "Chat");
        assert_eq!(EntityKind::Schedule.to_string(), "Schedule");
        assert_eq!(EntityKind::File.as_str(), "file");
    }
}
