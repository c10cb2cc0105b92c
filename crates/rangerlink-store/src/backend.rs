//! Backend selection from configuration.

use std::path::PathBuf;

use rangerlink_types::Snapshot;
use serde::Deserialize;

use crate::dragonfly::DragonflyStore;
use crate::error::StoreError;
use crate::file::JsonFileStore;
use crate::key::StorageKey;
use crate::memory::MemoryStore;
use crate::store::{SaveOutcome, SnapshotStore};

/// Which backend to persist snapshots to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreSettings {
    /// Keep snapshots in memory only.
    Memory,
    /// One JSON file per slot under `dir`.
    File {
        /// Directory for snapshot files.
        #[serde(default = "default_dir")]
        dir: PathBuf,
    },
    /// A `Dragonfly`/Redis server.
    Dragonfly {
        /// Redis URL of the server.
        url: String,
    },
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::File { dir: default_dir() }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("saves")
}

/// A store chosen at runtime.
#[derive(Debug)]
pub enum AnyStore {
    /// In-memory.
    Memory(MemoryStore),
    /// JSON files.
    File(JsonFileStore),
    /// `Dragonfly`.
    Dragonfly(DragonflyStore),
}

impl AnyStore {
    /// Open the store described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns the backend's connection error.
    pub async fn open(settings: &StoreSettings) -> Result<Self, StoreError> {
        match settings {
            StoreSettings::Memory => Ok(Self::Memory(MemoryStore::new())),
            StoreSettings::File { dir } => Ok(Self::File(JsonFileStore::new(dir))),
            StoreSettings::Dragonfly { url } => Ok(Self::Dragonfly(DragonflyStore::connect(url).await?)),
        }
    }
}

impl SnapshotStore for AnyStore {
    async fn load(&self, key: &StorageKey) -> Result<Option<Snapshot>, StoreError> {
        match self {
            Self::Memory(store) => store.load(key).await,
            Self::File(store) => store.load(key).await,
            Self::Dragonfly(store) => store.load(key).await,
        }
    }

    async fn save(&self, key: &StorageKey, snapshot: &Snapshot) -> Result<SaveOutcome, StoreError> {
        match self {
            Self::Memory(store) => store.save(key, snapshot).await,
            Self::File(store) => store.save(key, snapshot).await,
            Self::Dragonfly(store) => store.save(key, snapshot).await,
        }
    }
}
