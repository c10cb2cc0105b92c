//! Reconciliation logic for the RangerLink multiworld client.
//!
//! Everything in this crate operates on borrowed host state without doing
//! any I/O. It sits between `rangerlink-types` (the data model) and
//! `rangerlink-core` (the session controller that drives it each tick).
//!
//! # Modules
//!
//! - [`namespace`] -- The flat id space and its range table
//! - [`host`] -- The [`HostGame`] boundary and an in-memory host
//! - [`inventory`] -- FIFO slot allocation and the transient-slot stash
//! - [`reconciler`] -- Exactly-once application of the item stream
//! - [`traps`] -- Play-state gating and trap effects
//! - [`watcher`] -- Stage diffs, enemy drops and the goal check
//! - [`death_link`] -- Per-life-cycle death propagation
//! - [`books`] -- Book prices, hints and shop scouting
//! - [`error`] -- Parameter validation errors ([`ReconcileError`])

pub mod books;
pub mod death_link;
pub mod error;
pub mod host;
pub mod inventory;
pub mod namespace;
pub mod reconciler;
pub mod traps;
pub mod watcher;

pub use books::BookLedger;
pub use death_link::{DeathLink, DeathLinkAction, DeathLinkState};
pub use error::{ReconcileError, validate_layout};
pub use host::{EnemySpawn, HostGame, MemoryHost};
pub use inventory::{InventoryAllocator, Placement, StashSlot};
pub use namespace::IdKind;
pub use reconciler::{Application, BatchOutcome, Effects, Reconciler};
pub use traps::{TrapDispatcher, TrapEffect, TrapSettings};
pub use watcher::{CheckKind, OutboundCheck, ProgressWatcher};
