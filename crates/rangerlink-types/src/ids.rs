//! Type-safe identifier wrappers around the flat multiworld id space.
//!
//! The multiworld server uses one integer namespace for both locations
//! (things the local game reports) and items (things the server delivers).
//! Wrapping both in distinct newtypes prevents a location id from being
//! handed to an item path by accident, even though the numeric ranges
//! never overlap.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around a primitive integer with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
            Deserialize, TS,
        )]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw value.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Return the inner raw value.
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier of an item the multiworld server can deliver.
    ItemId(i64)
}

define_id! {
    /// Identifier of a location the local game can report as checked.
    LocationId(i64)
}

define_id! {
    /// Index of a stage in the host game's stage table.
    StageId(u16)
}

impl StageId {
    /// The stage index as a `usize`, suitable for slice lookups.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}
