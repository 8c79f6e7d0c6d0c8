use super::{ReadCommand, WriteCommand};
use crate::core::{
    Backend, Chat, EntityId, Model, ModelKind, ResourceRequirements, Result, StoreError,
};
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use uuid::Uuid;

/// Everything needed to register a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub kind: ModelKind,
    pub backend: Backend,
    pub skills: Vec<String>,
    pub resources: ResourceRequirements,
    pub location: String,
    pub author: String,
    pub version: String,
    pub is_default: bool,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, kind: ModelKind, backend: Backend) -> Self {
        Self {
            name: name.into(),
            kind,
            backend,
            skills: Vec::new(),
            resources: ResourceRequirements::default(),
            location: String::new(),
            author: String::new(),
            version: String::new(),
            is_default: false,
        }
    }

    /// A model served by a remote endpoint.
    pub fn remote(name: impl Into<String>, kind: ModelKind, endpoint: impl Into<String>) -> Self {
        Self::new(name, kind, Backend::Remote).location(endpoint)
    }

    pub fn skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn resources(mut self, ram_bytes: u64, size_bytes: u64) -> Self {
        self.resources = ResourceRequirements {
            ram_bytes,
            size_bytes,
        };
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn default_model(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Default language model: the flagged one, else the earliest registered.
pub(crate) fn default_language_model(state: &StoreState) -> Option<Model> {
    let mut candidates = state.query::<Model, _>(|model| model.kind.is_language());
    candidates.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    candidates.into_iter().next()
}

/// Chats whose primary language or image model is `model_id`.
pub(crate) fn chats_bound_to(state: &StoreState, model_id: EntityId) -> Vec<Chat> {
    state.query::<Chat, _>(|chat| chat.is_primary_bound_to(model_id))
}

fn insert_model(txn: &mut StoreTransaction, descriptor: ModelDescriptor) -> Result<Model> {
    let name = descriptor.name.trim();
    if name.is_empty() {
        return Err(StoreError::invalid_input("model name must not be empty"));
    }
    let model = Model {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind: descriptor.kind,
        backend: descriptor.backend,
        skills: descriptor.skills,
        resources: descriptor.resources,
        location: descriptor.location,
        author: descriptor.author,
        version: descriptor.version,
        is_default: descriptor.is_default,
        created_at: txn.now(),
    };
    if model.is_default {
        let previous = txn.query::<Model, _>(|other| other.kind == model.kind && other.is_default);
        for mut other in previous {
            other.is_default = false;
            txn.put(other)?;
        }
    }
    txn.put(model.clone())?;
    Ok(model)
}

pub struct CreateModel(pub ModelDescriptor);

impl WriteCommand for CreateModel {
    type Output = Model;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Model> {
        insert_model(txn, self.0)
    }
}

/// Registers a batch of models atomically.
pub struct CreateModels(pub Vec<ModelDescriptor>);

impl WriteCommand for CreateModels {
    type Output = Vec<Model>;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Vec<Model>> {
        self.0
            .into_iter()
            .map(|descriptor| insert_model(txn, descriptor))
            .collect()
    }
}

pub struct GetModel(pub EntityId);

impl ReadCommand for GetModel {
    type Output = Model;

    fn execute(self, state: &StoreState) -> Result<Model> {
        state.require::<Model>(self.0).cloned()
    }
}

/// Models in registration order, optionally of one kind.
#[derive(Default)]
pub struct ListModels {
    pub kind: Option<ModelKind>,
}

impl ListModels {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: ModelKind) -> Self {
        Self { kind: Some(kind) }
    }
}

impl ReadCommand for ListModels {
    type Output = Vec<Model>;

    fn execute(self, state: &StoreState) -> Result<Vec<Model>> {
        let mut models =
            state.query::<Model, _>(|model| self.kind.is_none_or(|kind| model.kind == kind));
        models.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(models)
    }
}

/// Deletes a model that is no chat's primary model, pruning it from every
/// fallback list.
pub struct DeleteModel(pub EntityId);

impl WriteCommand for DeleteModel {
    type Output = Model;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Model> {
        let model_id = self.0;
        txn.require::<Model>(model_id)?;

        let bound = chats_bound_to(txn.view(), model_id).len();
        if bound > 0 {
            return Err(StoreError::invalid_input(format!(
                "Model is currently used by {} chat(s). Switch those chats to another model before deleting it.",
                bound
            )));
        }

        let referencing = txn.query::<Chat, _>(|chat| chat.fallback_model_ids.contains(&model_id));
        let now = txn.now();
        for mut chat in referencing {
            chat.fallback_model_ids.retain(|id| *id != model_id);
            chat.updated_at = now;
            txn.put(chat)?;
        }
        txn.delete::<Model>(model_id)
    }
}
