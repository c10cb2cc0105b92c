//! In-memory snapshot store, used by tests and the replay tool.

use std::collections::BTreeMap;

use rangerlink_types::Snapshot;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::key::StorageKey;
use crate::store::{self, SaveOutcome, SnapshotStore};

/// Snapshots held in a map for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<StorageKey, Snapshot>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    async fn load(&self, key: &StorageKey) -> Result<Option<Snapshot>, StoreError> {
        let stored = self.entries.lock().await.get(key).cloned();
        stored.map(|snapshot| store::check_version(key, snapshot)).transpose()
    }

    async fn save(&self, key: &StorageKey, snapshot: &Snapshot) -> Result<SaveOutcome, StoreError> {
        let mut entries = self.entries.lock().await;
        let outcome = store::admit(entries.get(key), snapshot);
        if outcome == SaveOutcome::Written {
            entries.insert(key.clone(), snapshot.clone());
        }
        Ok(outcome)
    }
}
