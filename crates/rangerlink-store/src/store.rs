//! The snapshot store interface.
//!
//! Every backend stores one JSON [`Snapshot`] per [`StorageKey`]. Writes carry
//! the snapshot's `sequence`; a write whose sequence is lower than the stored
//! one is stale and is discarded, so an out-of-order write can never roll
//! persisted state backwards.

use std::future::Future;

use rangerlink_types::{SNAPSHOT_VERSION, Snapshot};

use crate::error::StoreError;
use crate::key::StorageKey;

/// What happened to a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot was written.
    Written,
    /// A snapshot with a higher sequence was already stored.
    Stale {
        /// Sequence of the stored snapshot.
        stored: u64,
    },
}

/// A keyed snapshot store.
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot for `key`, if one was ever saved.
    fn load(&self, key: &StorageKey) -> impl Future<Output = Result<Option<Snapshot>, StoreError>> + Send;

    /// Save `snapshot` under `key` unless a newer one is stored.
    fn save(&self, key: &StorageKey, snapshot: &Snapshot) -> impl Future<Output = Result<SaveOutcome, StoreError>> + Send;
}

/// Reject snapshots written by a newer schema.
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedVersion`] if `snapshot.version` is newer
/// than [`SNAPSHOT_VERSION`].
pub fn check_version(key: &StorageKey, snapshot: Snapshot) -> Result<Snapshot, StoreError> {
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            key: key.to_string(),
            found: snapshot.version,
            supported: SNAPSHOT_VERSION,
        });
    }
    Ok(snapshot)
}

/// Decide whether `incoming` may replace `stored`.
pub fn admit(stored: Option<&Snapshot>, incoming: &Snapshot) -> SaveOutcome {
    match stored {
        Some(existing) if existing.sequence > incoming.sequence => SaveOutcome::Stale {
            stored: existing.sequence,
        },
        _ => SaveOutcome::Written,
    }
}
