// ============================================================================
// Stored Entities
// ============================================================================
//
// Plain value types owned by the entity store. Commands receive and return
// clones of these; nothing outside the store holds a live reference.
//
// ============================================================================

use super::types::{Entity, EntityId, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

macro_rules! impl_entity {
    ($($ty:ty => $kind:expr),+ $(,)?) => {
        $(
            impl Entity for $ty {
                const KIND: EntityKind = $kind;

                fn id(&self) -> EntityId {
                    self.id
                }
            }
        )+
    };
}

impl_entity! {
    Personality => EntityKind::Personality,
    Chat => EntityKind::Chat,
    Message => EntityKind::Message,
    FileAttachment => EntityKind::File,
    Model => EntityKind::Model,
    Skill => EntityKind::Skill,
    Schedule => EntityKind::Schedule,
    Instance => EntityKind::Instance,
}

// ----------------------------------------------------------------------------
// Personalities & chats
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub id: EntityId,
    pub name: String,
    pub system_instruction: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ChunkingStrategy {
    #[default]
    Recursive,
    Paragraph,
    Sentence,
    FixedSize,
}

/// Unit chunk sizes are measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TokenUnit {
    #[default]
    Word,
    Character,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub strategy: ChunkingStrategy,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub token_unit: TokenUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::Recursive,
            chunk_size: 512,
            chunk_overlap: 64,
            token_unit: TokenUnit::Word,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: EntityId,
    pub title: String,
    pub personality_id: EntityId,
    pub language_model_id: EntityId,
    pub image_model_id: Option<EntityId>,
    /// Ordered backup models. Unique when edited through `AddFallbackModel`.
    pub fallback_model_ids: Vec<EntityId>,
    pub enabled_tools: BTreeSet<String>,
    /// Table in the retrieval index that holds this chat's documents.
    pub rag_table_id: String,
    pub chunking: ChunkingConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn rag_table_for(id: EntityId) -> String {
        format!("chat_{}", id.simple())
    }

    /// True when the model is this chat's primary language or image model.
    pub fn is_primary_bound_to(&self, model_id: EntityId) -> bool {
        self.language_model_id == model_id || self.image_model_id == Some(model_id)
    }
}

// ----------------------------------------------------------------------------
// Messages & channels
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    Final,
    Tool,
    Analysis,
    Commentary,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Final => "final",
            ChannelKind::Tool => "tool",
            ChannelKind::Analysis => "analysis",
            ChannelKind::Commentary => "commentary",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: serde_json::Value,
    pub recipient: Option<String>,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            recipient: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ToolExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Realized record of a tool invocation, attached to a tool channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: EntityId,
    pub request: ToolRequest,
    pub status: ToolExecutionStatus,
    pub result: Option<String>,
}

impl ToolExecution {
    pub fn from_request(request: ToolRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            status: ToolExecutionStatus::Pending,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: EntityId,
    pub kind: ChannelKind,
    pub content: String,
    /// Display position. List position carries no meaning.
    pub order: i32,
    pub is_complete: bool,
    pub recipient: Option<String>,
    pub tool_execution: Option<ToolExecution>,
}

impl Channel {
    pub fn new(kind: ChannelKind, order: i32, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content: content.into(),
            order,
            is_complete: false,
            recipient: None,
            tool_execution: None,
        }
    }

    pub fn complete(mut self, is_complete: bool) -> Self {
        self.is_complete = is_complete;
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_tool_execution(mut self, execution: ToolExecution) -> Self {
        self.tool_execution = Some(execution);
        self
    }
}

/// A streamed model response, split into channels keyed by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessedOutput {
    pub channels: Vec<Channel>,
}

impl ProcessedOutput {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: EntityId,
    pub chat_id: EntityId,
    pub user_input: String,
    /// Kept sorted by `Channel::order`.
    pub channels: Vec<Channel>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn final_channel(&self) -> Option<&Channel> {
        self.channels.iter().find(|c| c.kind == ChannelKind::Final)
    }

    pub fn channels_of(&self, kind: ChannelKind) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(move |c| c.kind == kind)
    }

    pub fn channel(&self, id: EntityId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }
}

// ----------------------------------------------------------------------------
// File attachments
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileState {
    Pending,
    Indexing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: EntityId,
    pub chat_id: EntityId,
    /// Local path, `file://` URL or `http(s)://` URL.
    pub source: String,
    pub name: String,
    /// Ingestion progress in `[0, 1]`.
    pub progress: f64,
    pub state: FileState,
    pub created_at: DateTime<Utc>,
}

// ----------------------------------------------------------------------------
// Model catalog
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    Language,
    DeepLanguage,
    FlexibleThinker,
    VisualLanguage,
    Diffusion,
}

impl ModelKind {
    /// Kinds that can serve as a chat's primary language model.
    pub fn is_language(&self) -> bool {
        !matches!(self, ModelKind::Diffusion)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Language => "language",
            ModelKind::DeepLanguage => "deep language",
            ModelKind::FlexibleThinker => "flexible thinker",
            ModelKind::VisualLanguage => "visual language",
            ModelKind::Diffusion => "diffusion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    Mlx,
    Gguf,
    CoreMl,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub ram_bytes: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: EntityId,
    pub name: String,
    pub kind: ModelKind,
    pub backend: Backend,
    /// Capability tags such as `"text"`, `"vision"` or `"reasoning"`.
    pub skills: Vec<String>,
    pub resources: ResourceRequirements,
    /// Local path or remote endpoint.
    pub location: String,
    pub author: String,
    pub version: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

// ----------------------------------------------------------------------------
// Skills
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub is_enabled: bool,
    pub tools: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Skill {
    pub fn matches_any_tool(&self, enabled_tools: &BTreeSet<String>) -> bool {
        self.tools.iter().any(|tool| enabled_tools.contains(tool))
    }
}

// ----------------------------------------------------------------------------
// Automation schedules
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleKind {
    Cron,
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleAction {
    #[default]
    Prompt,
    ToolRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: EntityId,
    pub title: String,
    pub prompt: String,
    pub kind: ScheduleKind,
    /// Five-field cron expression, or an ISO-8601 timestamp for one-shots.
    pub expression: String,
    /// IANA zone name the expression is evaluated in.
    pub timezone: String,
    pub is_enabled: bool,
    pub action: ScheduleAction,
    pub allowed_tools: Vec<String>,
    pub chat_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

// ----------------------------------------------------------------------------
// Agent gateway instances
// ----------------------------------------------------------------------------

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: EntityId,
    pub name: String,
    pub url: String,
    pub auth_token: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .finish()
    }
}
