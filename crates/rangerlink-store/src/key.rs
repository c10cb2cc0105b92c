//! Storage keys.
//!
//! A snapshot belongs to one slot of one game on one server, so the key is
//! `host:port:game:slot`. The same key is used by every backend.

use core::fmt;

/// Identifies the snapshot of one slot on one server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Game name.
    pub game: String,
    /// Slot (player) name.
    pub slot: String,
}

impl StorageKey {
    /// Build a key from its parts.
    pub fn new(host: impl Into<String>, port: u16, game: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            game: game.into(),
            slot: slot.into(),
        }
    }

    /// A file-name-safe rendering of the key.
    pub fn file_stem(&self) -> String {
        self.to_string()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.host, self.port, self.game, self.slot)
    }
}
