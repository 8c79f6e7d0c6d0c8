// ============================================================================
// Typed Commands
// ============================================================================
//
// Every operation on the store is a value implementing `ReadCommand` or
// `WriteCommand`. Reads run against a committed snapshot; writes run inside
// a `StoreTransaction` on the single writer task. Returning `Err` from a
// write discards its transaction.
//
// ============================================================================

pub mod bus;
pub mod chat;
pub mod context;
pub mod file;
pub mod instance;
pub mod message;
pub mod model;
pub mod personality;
pub mod schedule;
pub mod skill;
pub mod summary;

use crate::core::Result;
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;

pub use bus::{BusOptions, CommandBus, WriterTask};
pub use chat::{
    AddFallbackModel, ChatDeletion, CreateChat, DeleteChat, GetChat, GetFallbackModels,
    ListChats, RemoveFallbackModel, RenameChat, SetChatModel, SetEnabledTools,
    SetFallbackModels, SetImageModel,
};
pub use context::{ActiveSkill, ContextData, FetchContextData, SkillContext};
pub use file::{CreateFile, DeleteFile, GetFile, ListFiles, UpdateFileProgress};
pub use instance::{
    ActivateInstance, CreateInstance, DeleteInstance, GetActiveInstance, ListInstances,
};
pub use message::{
    CreateMessage, DeleteMessage, GetMessage, ListMessages, UpdateFinalChannelContent,
    UpdateProcessedOutput, UpdateToolExecution,
};
pub use model::{CreateModel, CreateModels, DeleteModel, GetModel, ListModels, ModelDescriptor};
pub use personality::{CreatePersonality, DeletePersonality, GetPersonality, ListPersonalities};
pub use schedule::{
    CreateSchedule, DeleteSchedule, FetchDue, GetSchedule, ListSchedules, MarkCompleted,
    SchedulePatch, SetScheduleEnabled, UpdateSchedule,
};
pub use skill::{CreateSkill, DeleteSkill, ListSkills, SetSkillEnabled};
pub use summary::{StoreSummary, Summarize};

/// A query over the last committed state.
pub trait ReadCommand: Send + 'static {
    type Output: Send + 'static;

    fn execute(self, state: &StoreState) -> Result<Self::Output>;

    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// A mutation applied atomically by the writer task.
pub trait WriteCommand: Send + 'static {
    type Output: Send + 'static;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Self::Output>;

    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
