use super::ReadCommand;
use crate::core::{
    Chat, FileAttachment, FileState, Instance, Message, Model, Personality, Result, Schedule,
    Skill,
};
use crate::storage::StoreState;
use serde::Serialize;

/// Record counts, as printed by `store-tool summary`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub personalities: usize,
    pub chats: usize,
    pub messages: usize,
    pub files: usize,
    pub files_ready: usize,
    pub models: usize,
    pub skills: usize,
    pub skills_enabled: usize,
    pub schedules: usize,
    pub schedules_enabled: usize,
    pub instances: usize,
}

pub struct Summarize;

impl ReadCommand for Summarize {
    type Output = StoreSummary;

    fn execute(self, state: &StoreState) -> Result<StoreSummary> {
        Ok(StoreSummary {
            personalities: state.count::<Personality>(),
            chats: state.count::<Chat>(),
            messages: state.count::<Message>(),
            files: state.count::<FileAttachment>(),
            files_ready: state.count_where::<FileAttachment, _>(|file| file.state == FileState::Ready),
            models: state.count::<Model>(),
            skills: state.count::<Skill>(),
            skills_enabled: state.count_where::<Skill, _>(|skill| skill.is_enabled),
            schedules: state.count::<Schedule>(),
            schedules_enabled: state.count_where::<Schedule, _>(|schedule| schedule.is_enabled),
            instances: state.count::<Instance>(),
        })
    }
}
