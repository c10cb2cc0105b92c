//! The flat multiworld identifier namespace.
//!
//! Every location the client reports and every item the server delivers is
//! a single integer. The numeric range an id falls into decides what it
//! means; the table below is the only place those ranges are written down.
//!
//! | Range           | Meaning                          |
//! |-----------------|----------------------------------|
//! | `10000..=10099` | stage-complete location          |
//! | `10100..=10199` | book location                    |
//! | `10200..=10999` | enemy-drop location              |
//! | `11000..=11999` | stage-unlock item                |
//! | `12000..=12999` | inventory item grant             |
//! | `13000..=13009` | trap                             |
//! | `14000..=14007` | party class unlock               |

use rangerlink_types::{CharacterClass, ItemId, LocationId, StageId, TrapKind};

/// Which range of the namespace an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeTag {
    /// Location: a stage was beaten.
    StageComplete,
    /// Location: a stage's book was bought.
    Book,
    /// Location: an enemy type dropped an item.
    EnemyDrop,
    /// Item: unlock a stage on the world map.
    StageUnlock,
    /// Item: place an item in the inventory.
    ItemGrant,
    /// Item: a disruptive trap.
    Trap,
    /// Item: unlock a party class.
    ClassUnlock,
}

/// A closed range of raw ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    /// What ids in this range mean.
    pub tag: RangeTag,
    /// First id in the range.
    pub first: i64,
    /// Last id in the range.
    pub last: i64,
}

impl IdRange {
    /// Whether `raw` falls inside the range.
    pub const fn contains(&self, raw: i64) -> bool {
        raw >= self.first && raw <= self.last
    }

    /// Offset of `raw` from the start of the range, if it is inside.
    pub fn offset(&self, raw: i64) -> Option<u16> {
        if !self.contains(raw) {
            return None;
        }
        u16::try_from(raw.checked_sub(self.first)?).ok()
    }

    /// The id at `offset` into the range, if it is inside.
    pub fn at(&self, offset: u16) -> Option<i64> {
        let raw = self.first.checked_add(i64::from(offset))?;
        self.contains(raw).then_some(raw)
    }
}

/// The complete range table, in ascending id order.
pub const RANGES: [IdRange; 7] = [
    IdRange {
        tag: RangeTag::StageComplete,
        first: 10_000,
        last: 10_099,
    },
    IdRange {
        tag: RangeTag::Book,
        first: 10_100,
        last: 10_199,
    },
    IdRange {
        tag: RangeTag::EnemyDrop,
        first: 10_200,
        last: 10_999,
    },
    IdRange {
        tag: RangeTag::StageUnlock,
        first: 11_000,
        last: 11_999,
    },
    IdRange {
        tag: RangeTag::ItemGrant,
        first: 12_000,
        last: 12_999,
    },
    IdRange {
        tag: RangeTag::Trap,
        first: 13_000,
        last: 13_009,
    },
    IdRange {
        tag: RangeTag::ClassUnlock,
        first: 14_000,
        last: 14_007,
    },
];

/// Look up the range entry for a tag.
pub fn range(tag: RangeTag) -> IdRange {
    RANGES
        .iter()
        .copied()
        .find(|entry| entry.tag == tag)
        .unwrap_or(IdRange {
            tag,
            first: 0,
            last: -1,
        })
}

/// A raw id resolved against the range table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// A stage was beaten.
    StageComplete(StageId),
    /// A stage's book was bought.
    Book(StageId),
    /// An enemy type (by index) dropped an item.
    EnemyDrop(u16),
    /// Unlock a stage.
    StageUnlock(StageId),
    /// Grant an item (by index in the host's item table).
    ItemGrant(u16),
    /// Fire a trap.
    Trap(TrapKind),
    /// Unlock a party class.
    ClassUnlock(CharacterClass),
}

impl IdKind {
    /// Whether this kind is reported by the client rather than delivered to it.
    pub const fn is_location(&self) -> bool {
        matches!(
            self,
            Self::StageComplete(_) | Self::Book(_) | Self::EnemyDrop(_)
        )
    }
}

/// Resolve a raw id. Returns `None` for ids outside every range.
pub fn classify(raw: i64) -> Option<IdKind> {
    let entry = RANGES.iter().find(|entry| entry.contains(raw))?;
    let offset = entry.offset(raw)?;
    match entry.tag {
        RangeTag::StageComplete => Some(IdKind::StageComplete(StageId(offset))),
        RangeTag::Book => Some(IdKind::Book(StageId(offset))),
        RangeTag::EnemyDrop => Some(IdKind::EnemyDrop(offset)),
        RangeTag::StageUnlock => Some(IdKind::StageUnlock(StageId(offset))),
        RangeTag::ItemGrant => Some(IdKind::ItemGrant(offset)),
        RangeTag::Trap => u8::try_from(offset).ok().map(|o| IdKind::Trap(TrapKind::from_offset(o))),
        RangeTag::ClassUnlock => {
            CharacterClass::from_offset(usize::from(offset)).map(IdKind::ClassUnlock)
        }
    }
}

/// Resolve a delivered item id.
pub fn classify_item(id: ItemId) -> Option<IdKind> {
    classify(id.0)
}

/// Resolve a reported location id.
pub fn classify_location(id: LocationId) -> Option<IdKind> {
    classify(id.0)
}

/// Location reported when `stage` is beaten.
pub fn stage_complete_location(stage: StageId) -> Option<LocationId> {
    range(RangeTag::StageComplete).at(stage.0).map(LocationId)
}

/// Location reported when the book for `stage` is bought.
pub fn book_location(stage: StageId) -> Option<LocationId> {
    range(RangeTag::Book).at(stage.0).map(LocationId)
}

/// Location reported the first time enemy type `enemy` drops an item.
pub fn enemy_drop_location(enemy: u16) -> Option<LocationId> {
    range(RangeTag::EnemyDrop).at(enemy).map(LocationId)
}

/// Item id that fires `trap`. Reserved traps map back to their offset.
pub fn trap_item(trap: TrapKind) -> Option<ItemId> {
    let offset = match trap {
        TrapKind::Unequip => 0,
        TrapKind::HalveGold => 1,
        TrapKind::KillMember => 2,
        TrapKind::Paralyze => 3,
        TrapKind::SpawnEnemies => 4,
        TrapKind::Reserved(offset) => offset,
    };
    range(RangeTag::Trap).at(u16::from(offset)).map(ItemId)
}
