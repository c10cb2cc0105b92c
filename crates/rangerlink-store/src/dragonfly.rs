//! `Dragonfly` (Redis-compatible) snapshot store.
//!
//! Lets several client processes, or a browser build and a native build,
//! share one snapshot per slot.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `rangerlink:{host}:{port}:{game}:{slot}` | JSON | Latest snapshot |

use fred::prelude::*;
use rangerlink_types::Snapshot;

use crate::error::StoreError;
use crate::key::StorageKey;
use crate::store::{self, SaveOutcome, SnapshotStore};

/// Prefix for every key this store writes.
pub const KEY_PREFIX: &str = "rangerlink";

/// Connection handle to a `Dragonfly` instance.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// The `Dragonfly` key holding the snapshot for `key`.
    pub fn redis_key(key: &StorageKey) -> String {
        format!("{KEY_PREFIX}:{key}")
    }

    async fn read(&self, key: &StorageKey) -> Result<Option<Snapshot>, StoreError> {
        let value: Option<String> = self.client.get(Self::redis_key(key)).await?;
        value
            .map(|text| serde_json::from_str(&text).map_err(StoreError::from))
            .transpose()
    }
}

impl std::fmt::Debug for DragonflyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragonflyStore").finish_non_exhaustive()
    }
}

impl SnapshotStore for DragonflyStore {
    async fn load(&self, key: &StorageKey) -> Result<Option<Snapshot>, StoreError> {
        self.read(key)
            .await?
            .map(|snapshot| store::check_version(key, snapshot))
            .transpose()
    }

    async fn save(&self, key: &StorageKey, snapshot: &Snapshot) -> Result<SaveOutcome, StoreError> {
        let stored = self.read(key).await?;
        let outcome = store::admit(stored.as_ref(), snapshot);
        if outcome != SaveOutcome::Written {
            return Ok(outcome);
        }
        let json = serde_json::to_string(snapshot)?;
        let _: () = self
            .client
            .set(Self::redis_key(key), json.as_str(), None, None, false)
            .await?;
        Ok(outcome)
    }
}
