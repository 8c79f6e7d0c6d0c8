use super::ReadCommand;
use crate::core::{Chat, EntityId, FileAttachment, Model, Personality, Result, Skill};
use crate::storage::StoreState;

/// An enabled skill that applies to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSkill {
    pub id: EntityId,
    pub name: String,
    pub instructions: String,
    /// Chat tools that made the skill apply.
    pub matched_tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillContext {
    pub skills: Vec<ActiveSkill>,
}

/// Everything needed to assemble a prompt for one chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextData {
    pub chat: Chat,
    pub personality: Personality,
    pub language_model: Model,
    pub image_model: Option<Model>,
    pub fallback_models: Vec<Model>,
    pub attachment_count: usize,
    /// `None` when no enabled skill shares a tool with the chat.
    pub skill_context: Option<SkillContext>,
}

pub struct FetchContextData(pub EntityId);

impl ReadCommand for FetchContextData {
    type Output = ContextData;

    fn execute(self, state: &StoreState) -> Result<ContextData> {
        let chat = state.require::<Chat>(self.0)?.clone();
        let personality = state.require::<Personality>(chat.personality_id)?.clone();
        let language_model = state.require::<Model>(chat.language_model_id)?.clone();
        let image_model = match chat.image_model_id {
            Some(model_id) => Some(state.require::<Model>(model_id)?.clone()),
            None => None,
        };
        let fallback_models = chat
            .fallback_model_ids
            .iter()
            .filter_map(|id| state.get::<Model>(*id).cloned())
            .collect();
        let attachment_count = state.count_where::<FileAttachment, _>(|file| file.chat_id == chat.id);
        let skill_context = skill_context_for(state, &chat);

        Ok(ContextData {
            chat,
            personality,
            language_model,
            image_model,
            fallback_models,
            attachment_count,
            skill_context,
        })
    }
}

fn skill_context_for(state: &StoreState, chat: &Chat) -> Option<SkillContext> {
    let mut skills: Vec<ActiveSkill> = state
        .query::<Skill, _>(|skill| skill.is_enabled && skill.matches_any_tool(&chat.enabled_tools))
        .into_iter()
        .map(|skill| ActiveSkill {
            matched_tools: skill
                .tools
                .iter()
                .filter(|tool| chat.enabled_tools.contains(*tool))
                .cloned()
                .collect(),
            id: skill.id,
            name: skill.name,
            instructions: skill.instructions,
        })
        .collect();
    if skills.is_empty() {
        return None;
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Some(SkillContext { skills })
}
