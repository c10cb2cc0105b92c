//! Background snapshot writer.
//!
//! The tick loop must never wait on storage, and two saves must never race.
//! [`SnapshotWriter`] owns a single task fed by a `watch` channel: the tick
//! submits the latest snapshot and moves on, the task writes whatever is
//! newest when it is free. Intermediate snapshots submitted while a write is
//! in flight are skipped; the last one submitted is always written.

use std::sync::Arc;

use rangerlink_types::Snapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::key::StorageKey;
use crate::store::{SaveOutcome, SnapshotStore};

/// Counts of what the writer task did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    /// Snapshots written.
    pub written: u64,
    /// Snapshots the store rejected as stale.
    pub stale: u64,
    /// Writes that failed.
    pub failed: u64,
}

/// Handle to the single in-flight snapshot writer for one key.
#[derive(Debug)]
pub struct SnapshotWriter {
    tx: watch::Sender<Option<Snapshot>>,
    handle: JoinHandle<WriterReport>,
}

impl SnapshotWriter {
    /// Spawn the writer task for `key`.
    pub fn spawn<S: SnapshotStore + 'static>(store: Arc<S>, key: StorageKey) -> Self {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(write_loop(store, key, rx));
        Self { tx, handle }
    }

    /// Queue `snapshot` to be written, replacing any not-yet-written one.
    pub fn submit(&self, snapshot: Snapshot) {
        self.tx.send_replace(Some(snapshot));
    }

    /// Write the last submitted snapshot, stop the task and report.
    pub async fn close(self) -> WriterReport {
        let Self { tx, handle } = self;
        drop(tx);
        match handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "snapshot writer task failed");
                WriterReport::default()
            }
        }
    }
}

async fn write_loop<S: SnapshotStore>(
    store: Arc<S>,
    key: StorageKey,
    mut rx: watch::Receiver<Option<Snapshot>>,
) -> WriterReport {
    let mut report = WriterReport::default();
    while rx.changed().await.is_ok() {
        let Some(snapshot) = rx.borrow_and_update().clone() else {
            continue;
        };
        match store.save(&key, &snapshot).await {
            Ok(SaveOutcome::Written) => {
                report.written = report.written.saturating_add(1);
                tracing::debug!(%key, sequence = snapshot.sequence, "snapshot saved");
            }
            Ok(SaveOutcome::Stale { stored }) => {
                report.stale = report.stale.saturating_add(1);
                tracing::debug!(%key, stored, incoming = snapshot.sequence, "stale snapshot skipped");
            }
            Err(e) => {
                report.failed = report.failed.saturating_add(1);
                tracing::warn!(%key, error = %e, "snapshot save failed");
            }
        }
    }
    report
}
