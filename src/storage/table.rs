use crate::core::{Entity, EntityId};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Copy-on-write record table keyed by entity id.
///
/// Cloning a table is O(1): `im::OrdMap` shares structure between versions,
/// so a transaction's working copy and the published snapshot only diverge
/// on the nodes a write actually touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de> + Clone"))]
pub struct Table<T: Clone> {
    rows: OrdMap<EntityId, T>,
}

impl<T: Clone> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: OrdMap::new(),
        }
    }
}

impl<T: Entity> Table<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.rows.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.rows.contains_key(id)
    }

    /// Insert or replace a record, returning the previous version.
    pub fn put(&mut self, record: T) -> Option<T> {
        self.rows.insert(record.id(), record)
    }

    pub fn delete(&mut self, id: &EntityId) -> Option<T> {
        self.rows.remove(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    /// Clones every record matching the predicate, in id order.
    pub fn query<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.rows
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    pub fn count_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        self.rows.values().filter(|record| predicate(record)).count()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Personality;
    use chrono::Utc;
    use uuid::Uuid;

    fn personality(name: &str) -> Personality {
        Personality {
            id: Uuid::new_v4(),
            name: name.to_string(),
            system_instruction: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_replaces_and_returns_previous() {
        let mut table = Table::new();
        let mut record = personality("tutor");
        assert!(table.put(record.clone()).is_none());

        record.name = "coach".to_string();
        let previous = table.put(record.clone()).unwrap();
        assert_eq!(previous.name, "tutor");
        assert_eq!(table.get(&record.id).unwrap().name, "coach");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clone_is_isolated_from_later_writes() {
        let mut table = Table::new();
        let record = personality("tutor");
        table.put(record.clone());

        let snapshot = table.clone();
        table.delete(&record.id);

        assert!(table.is_empty());
        assert!(snapshot.contains(&record.id));
    }

    #[test]
    fn test_query_by_predicate() {
        let mut table = Table::new();
        table.put(personality("alpha"));
        table.put(personality("beta"));
        table.put(personality("alpine"));

        let matches = table.query(|p| p.name.starts_with("al"));
        assert_eq!(matches.len(), 2);
        assert_eq!(table.count_where(|p| p.name == "beta"), 1);
    }
}
