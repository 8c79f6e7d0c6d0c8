use super::{ReadCommand, WriteCommand};
use crate::core::{EntityId, Instance, Result, StoreError};
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use uuid::Uuid;

const ACCEPTED_SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

fn by_creation(instances: &mut [Instance]) {
    instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// Fails unless at most one instance is active, and exactly one when any exist.
pub(crate) fn ensure_single_active(state: &StoreState) -> Result<()> {
    let total = state.count::<Instance>();
    let active = state.count_where::<Instance, _>(|instance| instance.is_active);
    let valid = if total == 0 { active == 0 } else { active == 1 };
    if !valid {
        return Err(StoreError::ConstraintViolation(format!(
            "{} of {} instances are active, expected exactly one",
            active, total
        )));
    }
    Ok(())
}

/// Registers a remote agent instance. The first one becomes active.
pub struct CreateInstance {
    pub name: String,
    pub url: String,
    pub auth_token: Option<String>,
}

impl CreateInstance {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            auth_token: None,
        }
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

impl WriteCommand for CreateInstance {
    type Output = Instance;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Instance> {
        let url = self.url.trim().to_string();
        let lowered = url.to_ascii_lowercase();
        let has_host = ACCEPTED_SCHEMES
            .iter()
            .find(|scheme| lowered.starts_with(**scheme))
            .is_some_and(|scheme| url.len() > scheme.len());
        if !has_host {
            return Err(StoreError::invalid_input(format!(
                "instance URL '{}' must start with http://, https://, ws:// or wss://",
                url
            )));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(StoreError::invalid_input("instance name must not be empty"));
        }

        let first = txn.view().count::<Instance>() == 0;
        let instance = Instance {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url,
            auth_token: self.auth_token.filter(|token| !token.is_empty()),
            is_active: first,
            created_at: txn.now(),
        };
        txn.put(instance.clone())?;
        ensure_single_active(txn.view())?;
        Ok(instance)
    }
}

/// Makes one instance the only active one.
pub struct ActivateInstance(pub EntityId);

impl WriteCommand for ActivateInstance {
    type Output = Instance;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Instance> {
        let target = self.0;
        let mut activated = txn.require::<Instance>(target)?.clone();

        let others = txn.query::<Instance, _>(|instance| instance.is_active && instance.id != target);
        for mut other in others {
            other.is_active = false;
            txn.put(other)?;
        }
        if !activated.is_active {
            activated.is_active = true;
            txn.put(activated.clone())?;
        }
        ensure_single_active(txn.view())?;
        Ok(activated)
    }
}

/// Deletes an instance. Removing the active one promotes the earliest
/// remaining instance.
pub struct DeleteInstance(pub EntityId);

impl WriteCommand for DeleteInstance {
    type Output = Instance;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Instance> {
        let removed = txn.delete::<Instance>(self.0)?;
        if removed.is_active {
            let mut remaining = txn.view().all::<Instance>();
            by_creation(&mut remaining);
            if let Some(mut promoted) = remaining.into_iter().next() {
                promoted.is_active = true;
                txn.put(promoted)?;
            }
        }
        ensure_single_active(txn.view())?;
        Ok(removed)
    }
}

/// Instances in creation order.
pub struct ListInstances;

impl ReadCommand for ListInstances {
    type Output = Vec<Instance>;

    fn execute(self, state: &StoreState) -> Result<Vec<Instance>> {
        let mut instances = state.all::<Instance>();
        by_creation(&mut instances);
        Ok(instances)
    }
}

pub struct GetActiveInstance;

impl ReadCommand for GetActiveInstance {
    type Output = Option<Instance>;

    fn execute(self, state: &StoreState) -> Result<Option<Instance>> {
        Ok(state
            .query::<Instance, _>(|instance| instance.is_active)
            .into_iter()
            .next())
    }
}
