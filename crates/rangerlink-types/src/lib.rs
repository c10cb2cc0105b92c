//! Shared type definitions for the RangerLink multiworld client.
//!
//! This crate is the single source of truth for the data model shared by the
//! reconciliation logic, the persistence layer and the session controller.
//! Types that cross into the host game's JavaScript bridge derive `ts-rs`
//! bindings.
//!
//! # Modules
//!
//! - [`ids`] -- Newtype wrappers for item, location and stage identifiers
//! - [`enums`] -- Progression phases, classes, traps and session options
//! - [`structs`] -- Stage record, inventory, party, session config, snapshot
//! - [`events`] -- Events delivered by the remote session

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{BookCostMode, CharacterClass, HintMode, ItemClassification, Phase, TrapKind};
pub use events::{DeathNotice, ItemBatch, NetworkHint, RemoteEvent};
pub use ids::{ItemId, LocationId, StageId};
pub use structs::{
    BookHint, InventoryLayout, InventorySlots, ModSettings, PartyMember, SNAPSHOT_VERSION,
    SessionConfig, SlotItem, Snapshot, StageFlags, StageRecord,
};
