//! JSON file snapshot store.
//!
//! One pretty-printed JSON file per key under a directory. Writes go to a
//! temporary sibling first and are renamed over the target, so a crash
//! mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use rangerlink_types::Snapshot;

use crate::error::StoreError;
use crate::key::StorageKey;
use crate::store::{self, SaveOutcome, SnapshotStore};

/// Snapshots stored as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// A store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory snapshots are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `key`.
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    async fn read(&self, path: &Path) -> Result<Option<Snapshot>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_owned(),
        source,
    }
}

impl SnapshotStore for JsonFileStore {
    async fn load(&self, key: &StorageKey) -> Result<Option<Snapshot>, StoreError> {
        let path = self.path_for(key);
        self.read(&path)
            .await?
            .map(|snapshot| store::check_version(key, snapshot))
            .transpose()
    }

    async fn save(&self, key: &StorageKey, snapshot: &Snapshot) -> Result<SaveOutcome, StoreError> {
        let path = self.path_for(key);
        let stored = self.read(&path).await?;
        let outcome = store::admit(stored.as_ref(), snapshot);
        if let SaveOutcome::Stale { stored: newer } = outcome {
            tracing::debug!(%key, stored = newer, incoming = snapshot.sequence, "stale snapshot discarded");
            return Ok(outcome);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error(&path))?;
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rangerlink_types::{ItemId, StageRecord};

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rangerlink-store-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn snapshot_survives_a_new_store_instance() {
        let dir = scratch_dir("reopen");
        let key = StorageKey::new("localhost", 38281, "Ranger", "Mia");
        let snapshot = Snapshot {
            sequence: 1,
            received_items: vec![ItemId(11_002), ItemId(12_001)],
            stage_status: StageRecord::from(vec![1, 3]),
            ..Snapshot::default()
        };
        JsonFileStore::new(&dir).save(&key, &snapshot).await.unwrap();

        let reopened = JsonFileStore::new(&dir);
        assert_eq!(reopened.load(&key).await.unwrap(), Some(snapshot));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let store = JsonFileStore::new(scratch_dir("missing"));
        let key = StorageKey::new("nowhere", 1, "Ranger", "Nobody");
        assert!(store.load(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_write_leaves_file_untouched() {
        let dir = scratch_dir("stale");
        let store = JsonFileStore::new(&dir);
        let key = StorageKey::new("localhost", 38281, "Ranger", "Mia");
        let newer = Snapshot {
            sequence: 5,
            goal_reported: true,
            ..Snapshot::default()
        };
        store.save(&key, &newer).await.unwrap();
        let outcome = store
            .save(&key, &Snapshot {
                sequence: 2,
                ..Snapshot::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Stale { stored: 5 });
        assert!(store.load(&key).await.unwrap().unwrap().goal_reported);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn browser_schema_is_readable() {
        let dir = scratch_dir("schema");
        let store = JsonFileStore::new(&dir);
        let key = StorageKey::new("localhost", 38281, "Ranger", "Mia");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            store.path_for(&key),
            r#"{"receivedItems":[12001],"stageStatus":[3],"bookHints":{},"randomizedBookCosts":{}}"#,
        )
        .await
        .unwrap();
        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.received_items, vec![ItemId(12_001)]);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
