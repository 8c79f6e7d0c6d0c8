use super::{ReadCommand, WriteCommand};
use crate::core::{EntityId, Result, Skill, StoreError};
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use uuid::Uuid;

/// Registers a skill. Names are unique, ignoring case.
pub struct CreateSkill {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub tools: Vec<String>,
    pub is_enabled: bool,
}

impl CreateSkill {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            tools: Vec::new(),
            is_enabled: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }
}

impl WriteCommand for CreateSkill {
    type Output = Skill;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Skill> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::invalid_input("skill name must not be empty"));
        }
        let lowered = name.to_lowercase();
        let taken = !txn
            .query::<Skill, _>(|skill| skill.name.to_lowercase() == lowered)
            .is_empty();
        if taken {
            return Err(StoreError::invalid_input(format!(
                "a skill named '{}' already exists",
                name
            )));
        }
        let skill = Skill {
            id: Uuid::new_v4(),
            name,
            description: self.description,
            instructions: self.instructions,
            is_enabled: self.is_enabled,
            tools: self.tools,
            created_at: txn.now(),
        };
        txn.put(skill.clone())?;
        Ok(skill)
    }
}

pub struct SetSkillEnabled {
    pub skill_id: EntityId,
    pub enabled: bool,
}

impl WriteCommand for SetSkillEnabled {
    type Output = Skill;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Skill> {
        let mut skill = txn.require::<Skill>(self.skill_id)?.clone();
        if skill.is_enabled != self.enabled {
            skill.is_enabled = self.enabled;
            txn.put(skill.clone())?;
        }
        Ok(skill)
    }
}

pub struct DeleteSkill(pub EntityId);

impl WriteCommand for DeleteSkill {
    type Output = Skill;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Skill> {
        txn.delete::<Skill>(self.0)
    }
}

/// Skills sorted by name.
pub struct ListSkills;

impl ReadCommand for ListSkills {
    type Output = Vec<Skill>;

    fn execute(self, state: &StoreState) -> Result<Vec<Skill>> {
        let mut skills = state.all::<Skill>();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(skills)
    }
}
