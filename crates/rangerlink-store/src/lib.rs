//! Snapshot persistence for the RangerLink client.
//!
//! A snapshot is everything the client needs to resume a slot without
//! double-applying items: the received log, stage bits, queues, stashes,
//! book data and the host's own save. One snapshot is kept per
//! [`StorageKey`].
//!
//! ```text
//! Tick
//!   |
//!   +-- submit(snapshot) --> SnapshotWriter (watch, latest wins)
//!                               |
//!                               +-- save --> MemoryStore | JsonFileStore | DragonflyStore
//! ```
//!
//! # Modules
//!
//! - [`store`] -- The [`SnapshotStore`] trait and staleness rules
//! - [`memory`] -- In-memory store
//! - [`file`] -- JSON file store
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) store
//! - [`backend`] -- Runtime backend selection
//! - [`writer`] -- Single in-flight background writer
//! - [`key`] -- Storage keys
//! - [`error`] -- Shared error types

pub mod backend;
pub mod dragonfly;
pub mod error;
pub mod file;
pub mod key;
pub mod memory;
pub mod store;
pub mod writer;

// Re-export primary types for convenience.
pub use backend::{AnyStore, StoreSettings};
pub use dragonfly::DragonflyStore;
pub use error::StoreError;
pub use file::JsonFileStore;
pub use key::StorageKey;
pub use memory::MemoryStore;
pub use store::{SaveOutcome, SnapshotStore};
pub use writer::{SnapshotWriter, WriterReport};
