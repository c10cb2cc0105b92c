//! Enumeration types for the RangerLink client.
//!
//! Covers the host game's progression phases, the party classes that can be
//! unlocked by the server, the trap catalog, and the small option enums
//! negotiated at login.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Progression phase
// ---------------------------------------------------------------------------

/// The host game's discrete progression-phase counter.
///
/// The host moves between menus, the world map, stages, towns and the game
/// over screen by changing this value. The client never interprets values
/// it does not name below; it only compares against the named thresholds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct Phase(pub u16);

impl Phase {
    /// Title screen.
    pub const TITLE: Self = Self(0);
    /// Party creation screen of a fresh game.
    pub const NEW_GAME: Self = Self(4);
    /// World map. Also the lower bound of an active session.
    pub const MAP: Self = Self(6);
    /// Inside a combat stage.
    pub const STAGE: Self = Self(12);
    /// Party defeat (game over) screen.
    pub const DEFEAT: Self = Self(30);
    /// Town shop screen.
    pub const SHOP: Self = Self(54);

    /// Phases in which disruptive effects are safe to observe.
    pub const ACTIVE_PLAY: [Self; 5] = [Self(12), Self(52), Self(53), Self(54), Self(55)];

    /// Whether traps and remote deaths may be applied in this phase.
    pub fn is_active_play(self) -> bool {
        Self::ACTIVE_PLAY.contains(&self)
    }

    /// Whether a game session is running (map or later).
    ///
    /// Falling below this threshold resets per-life state such as death-link.
    pub fn is_session_active(self) -> bool {
        self >= Self::MAP
    }

    /// Whether the player can currently interact with the inventory.
    pub fn is_playable(self) -> bool {
        self.is_session_active() && self != Self::DEFEAT
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Party classes
// ---------------------------------------------------------------------------

/// A party member class that the server can unlock.
///
/// Class unlock items occupy `14000..14008`, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum CharacterClass {
    /// Bare-handed melee fighter.
    Boxer,
    /// Sword-wielding melee fighter.
    Gladiator,
    /// Bow-wielding ranged attacker.
    Sniper,
    /// Elemental spell caster.
    Magician,
    /// Healer.
    Priest,
    /// Long-range gun user.
    Gunner,
    /// Mid-range whip user.
    Whipper,
    /// Flying support class.
    Angel,
}

impl CharacterClass {
    /// All classes, indexed by their offset in the class-unlock range.
    pub const ALL: [Self; 8] = [
        Self::Boxer,
        Self::Gladiator,
        Self::Sniper,
        Self::Magician,
        Self::Priest,
        Self::Gunner,
        Self::Whipper,
        Self::Angel,
    ];

    /// Look up a class by its offset in the class-unlock range.
    pub fn from_offset(offset: usize) -> Option<Self> {
        Self::ALL.get(offset).copied()
    }
}

// ---------------------------------------------------------------------------
// Traps
// ---------------------------------------------------------------------------

/// A disruptive effect delivered by the server.
///
/// Trap items occupy `13000..13010`; offsets past the last named trap are
/// reserved and map to [`TrapKind::Reserved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum TrapKind {
    /// Strip equipment from the party into the inventory.
    Unequip,
    /// Halve the party's gold.
    HalveGold,
    /// Kill one living party member.
    KillMember,
    /// Paralyze every living party member for a random duration.
    Paralyze,
    /// Spawn a pack of random enemies.
    SpawnEnemies,
    /// A trap id inside the range with no effect assigned.
    Reserved(u8),
}

impl TrapKind {
    /// Map an offset within the trap range to a trap.
    pub fn from_offset(offset: u8) -> Self {
        match offset {
            0 => Self::Unequip,
            1 => Self::HalveGold,
            2 => Self::KillMember,
            3 => Self::Paralyze,
            4 => Self::SpawnEnemies,
            other => Self::Reserved(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Session options
// ---------------------------------------------------------------------------

/// Classification flags the server attaches to a networked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ItemClassification {
    /// No special flags.
    Filler,
    /// Required to finish some world's goal.
    Progression,
    /// Helpful but not required.
    Useful,
    /// Harmful to the receiver.
    Trap,
}

impl ItemClassification {
    /// Decode the raw server flag bits. Progression wins over the others.
    pub const fn from_flags(flags: u8) -> Self {
        if flags & 0b001 != 0 {
            Self::Progression
        } else if flags & 0b010 != 0 {
            Self::Useful
        } else if flags & 0b100 != 0 {
            Self::Trap
        } else {
            Self::Filler
        }
    }
}

/// Whether a location scout should also create a server-side hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum HintMode {
    /// Only report the contents back to this client.
    NoHint,
    /// Create a hint and announce it.
    Announce,
    /// Create a hint, announcing only ones that did not exist yet.
    AnnounceNew,
}

impl HintMode {
    /// The wire value of this mode.
    pub const fn as_wire(self) -> u8 {
        match self {
            Self::NoHint => 0,
            Self::Announce => 1,
            Self::AnnounceNew => 2,
        }
    }
}

/// How shop book prices are randomized for a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BookCostMode {
    /// Use the game's own prices.
    #[default]
    Vanilla,
    /// Prices scale with the stage index, skewed toward the low end.
    Scaled,
    /// Uniform random price up to 99 999.
    Random,
    /// Uniform random price up to 999 999.
    Chaos,
}

impl TryFrom<u8> for BookCostMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Vanilla),
            1 => Ok(Self::Scaled),
            2 => Ok(Self::Random),
            3 => Ok(Self::Chaos),
            other => Err(format!("unknown book cost mode {other}")),
        }
    }
}

impl From<BookCostMode> for u8 {
    fn from(mode: BookCostMode) -> Self {
        match mode {
            BookCostMode::Vanilla => 0,
            BookCostMode::Scaled => 1,
            BookCostMode::Random => 2,
            BookCostMode::Chaos => 3,
        }
    }
}
