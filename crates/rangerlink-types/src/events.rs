//! Events delivered by the multiworld server.
//!
//! The transport decodes server packets into [`RemoteEvent`] values and
//! pushes them into the client's backlog. Every packet type the client
//! cares about has exactly one variant, so dispatch is an exhaustive
//! `match` rather than a string switch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{ItemId, LocationId};

/// A contiguous run of item deliveries from the server's item stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ItemBatch {
    /// Stream index of the first item in `items`. Zero means the server is
    /// sending the stream from its start.
    pub start_index: u64,
    /// Delivered item ids in stream order.
    pub items: Vec<ItemId>,
}

impl ItemBatch {
    /// Stream index one past the last item in this batch.
    pub fn end_index(&self) -> u64 {
        let len = u64::try_from(self.items.len()).unwrap_or(u64::MAX);
        self.start_index.saturating_add(len)
    }
}

/// One scouted location's contents, with names already resolved by the
/// transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NetworkHint {
    /// The scouted location.
    pub location: LocationId,
    /// Name of the player that owns the item.
    pub player: String,
    /// Name of the item.
    pub item: String,
    /// Raw classification flags.
    pub flags: u8,
}

/// A death broadcast by another session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DeathNotice {
    /// Slot name of the player that died.
    pub source: String,
    /// When the death happened.
    pub time: DateTime<Utc>,
    /// Free-form cause, if the sender supplied one.
    pub cause: Option<String>,
}

/// An event from the remote session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RemoteEvent {
    /// The server accepted the login.
    Connected,
    /// Items were delivered.
    ItemsDelivered {
        /// The delivered batch.
        batch: ItemBatch,
    },
    /// Results of a location scout.
    LocationInfo {
        /// One entry per scouted location.
        hints: Vec<NetworkHint>,
    },
    /// The server rejected the login.
    ConnectionRefused {
        /// One entry per rejection reason.
        errors: Vec<String>,
    },
    /// The connection closed.
    Disconnected {
        /// Close reason, if the transport knows one.
        reason: Option<String>,
    },
    /// Another session reported a death.
    DeathReceived {
        /// The death.
        notice: DeathNotice,
    },
    /// A bounce packet this client has no handler for.
    Bounced {
        /// Tags attached to the bounce.
        tags: Vec<String>,
    },
    /// The server could not parse a packet this client sent.
    InvalidPacket {
        /// Server's description.
        text: String,
    },
}

impl RemoteEvent {
    /// Short name of the event kind, for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::ItemsDelivered { .. } => "items_delivered",
            Self::LocationInfo { .. } => "location_info",
            Self::ConnectionRefused { .. } => "connection_refused",
            Self::Disconnected { .. } => "disconnected",
            Self::DeathReceived { .. } => "death_received",
            Self::Bounced { .. } => "bounced",
            Self::InvalidPacket { .. } => "invalid_packet",
        }
    }
}
