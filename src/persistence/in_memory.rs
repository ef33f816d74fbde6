use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{ExecutionSnapshot, PersistenceProvider, RecoveryCatalog};
use crate::error::Result;

type Key = (Uuid, Uuid);

/// In-memory reference [`PersistenceProvider`], grounded on the same
/// `Mutex<Vec<_>>`-backed-async-trait shape used for in-process test doubles elsewhere in
/// this crate. Keeps the `max_versions` most-recently-saved snapshots per key, evicting
/// the oldest on overflow; `max_versions == 0` means unlimited.
pub struct InMemoryPersistenceProvider {
    max_versions: u32,
    snapshots: Mutex<HashMap<Key, Vec<ExecutionSnapshot>>>,
    insertion_order: Mutex<Vec<Key>>,
}

impl InMemoryPersistenceProvider {
    pub fn new(max_versions: u32) -> Self {
        Self {
            max_versions,
            snapshots: Mutex::new(HashMap::new()),
            insertion_order: Mutex::new(Vec::new()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }
}

impl Default for InMemoryPersistenceProvider {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl PersistenceProvider for InMemoryPersistenceProvider {
    async fn save(&self, snapshot: ExecutionSnapshot) -> Result<()> {
        let key = (snapshot.foundry_execution_id, snapshot.workflow_id);
        let mut guard = self.snapshots.lock().unwrap();
        let is_new_key = !guard.contains_key(&key);
        let versions = guard.entry(key).or_insert_with(Vec::new);
        versions.push(snapshot);
        if is_new_key {
            self.insertion_order.lock().unwrap().push(key);
        }

        if self.max_versions > 0 {
            while versions.len() > self.max_versions as usize {
                versions.remove(0);
            }
        }

        Ok(())
    }

    async fn try_load(&self, foundry_execution_id: Uuid, workflow_id: Uuid) -> Result<Option<ExecutionSnapshot>> {
        let guard = self.snapshots.lock().unwrap();
        Ok(guard
            .get(&(foundry_execution_id, workflow_id))
            .and_then(|versions| versions.last().cloned()))
    }

    async fn delete(&self, foundry_execution_id: Uuid, workflow_id: Uuid) -> Result<()> {
        let key = (foundry_execution_id, workflow_id);
        self.snapshots.lock().unwrap().remove(&key);
        self.insertion_order.lock().unwrap().retain(|k| k != &key);
        Ok(())
    }
}

#[async_trait]
impl RecoveryCatalog for InMemoryPersistenceProvider {
    async fn list_pending(&self) -> Result<Vec<ExecutionSnapshot>> {
        let order = self.insertion_order.lock().unwrap();
        let guard = self.snapshots.lock().unwrap();
        Ok(order
            .iter()
            .filter_map(|key| guard.get(key).and_then(|versions| versions.last().cloned()))
            .collect())
    }
}
