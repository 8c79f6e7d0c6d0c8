pub mod entities;
pub mod error;
pub mod types;

pub use entities::{
    Backend, Channel, ChannelKind, Chat, ChunkingConfig, ChunkingStrategy, FileAttachment,
    FileState, Instance, Message, Model, ModelKind, Personality, ProcessedOutput,
    ResourceRequirements, Schedule, ScheduleAction, ScheduleKind, Skill, TokenUnit,
    ToolExecution, ToolExecutionStatus, ToolRequest,
};
pub use error::{Result, StoreError};
pub use types::{Entity, EntityId, EntityKind};
