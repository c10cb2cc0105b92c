//! The boundary to the host game.
//!
//! The client never owns the game's state. Each tick it borrows the stage
//! record, inventory and party through [`HostGame`], makes additive changes,
//! and asks the host to [`seal`](HostGame::seal) them so the game's own save
//! integrity check accepts the new values.
//!
//! [`MemoryHost`] is a plain in-memory host used by tests and by the replay
//! tool.

use std::collections::BTreeSet;

use rangerlink_types::{
    CharacterClass, InventoryLayout, InventorySlots, ModSettings, PartyMember, Phase, SlotItem,
    StageRecord,
};

/// An enemy the client asks the host to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnemySpawn {
    /// Index in the host's enemy table.
    pub enemy_id: u16,
    /// Horizontal position.
    pub x: i32,
    /// Vertical position, on the ground.
    pub y: i32,
}

/// Access to the running host game.
pub trait HostGame {
    /// Current progression phase.
    fn phase(&self) -> Phase;

    /// Force the host into a phase. Used to return to the title screen when
    /// a connection attempt fails.
    fn set_phase(&mut self, phase: Phase);

    /// The live stage record.
    fn stages(&self) -> &StageRecord;

    /// Mutable access to the live stage record.
    fn stages_mut(&mut self) -> &mut StageRecord;

    /// The live inventory.
    fn inventory(&self) -> &InventorySlots;

    /// Mutable access to the live inventory.
    fn inventory_mut(&mut self) -> &mut InventorySlots;

    /// Party vitals, one entry per member.
    fn party(&self) -> &[PartyMember];

    /// Mutable access to party vitals.
    fn party_mut(&mut self) -> &mut [PartyMember];

    /// Current gold.
    fn gold(&self) -> u64;

    /// Overwrite current gold.
    fn set_gold(&mut self, gold: u64);

    /// Width of the current stage in host coordinates.
    fn stage_width(&self) -> i32;

    /// Height of solid ground at `x`, or `None` if there is no floor there.
    fn ground_level(&self, x: i32) -> Option<i32>;

    /// Spawn an enemy in the current stage.
    fn spawn_enemy(&mut self, spawn: EnemySpawn);

    /// Make a party class selectable.
    fn unlock_class(&mut self, class: CharacterClass);

    /// Clear the host's record of what killed the party, so a remote death
    /// is not attributed to a local enemy.
    fn clear_death_metadata(&mut self);

    /// Enemy types that dropped an item since the last call.
    fn take_enemy_drops(&mut self) -> Vec<u16>;

    /// Equipment the host displaced while swapping a member's class.
    fn take_displaced_equipment(&mut self) -> Vec<SlotItem>;

    /// Publish session options the host reads while simulating.
    fn apply_mod_settings(&mut self, settings: &ModSettings);

    /// Serialize the host's own save, if a game is loaded.
    fn export_save(&self) -> Option<String>;

    /// Load a save previously produced by [`export_save`](Self::export_save).
    fn import_save(&mut self, save: &str);

    /// Recompute the host's save integrity checksum after external edits.
    fn seal(&mut self);
}

/// In-memory [`HostGame`] with every field public.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    /// Current phase.
    pub phase: Phase,
    /// Stage record.
    pub stages: StageRecord,
    /// Inventory.
    pub inventory: InventorySlots,
    /// Party vitals.
    pub party: Vec<PartyMember>,
    /// Gold.
    pub gold: u64,
    /// Stage width for spawn placement.
    pub width: i32,
    /// Ground height per column; `None` marks a pit.
    pub ground: Vec<Option<i32>>,
    /// Enemies spawned so far.
    pub spawned: Vec<EnemySpawn>,
    /// Classes unlocked so far.
    pub classes: BTreeSet<CharacterClass>,
    /// Drops waiting to be collected by the client.
    pub enemy_drops: Vec<u16>,
    /// Displaced equipment waiting to be collected by the client.
    pub displaced: Vec<SlotItem>,
    /// Last published settings.
    pub settings: Option<ModSettings>,
    /// Save string returned by `export_save`.
    pub save: Option<String>,
    /// Saves passed to `import_save`, in order.
    pub imported: Vec<String>,
    /// Number of `clear_death_metadata` calls.
    pub death_metadata_clears: u32,
    /// Number of `seal` calls.
    pub seals: u32,
}

impl MemoryHost {
    /// A host at the title screen with `stage_count` locked stages, an empty
    /// inventory and `party_size` healthy members.
    pub fn new(stage_count: usize, layout: InventoryLayout, party_size: usize) -> Self {
        let member = PartyMember {
            hp: 100,
            max_hp: 100,
            paralysis: 0,
        };
        Self {
            phase: Phase::TITLE,
            stages: StageRecord::new(stage_count),
            inventory: InventorySlots::new(layout),
            party: vec![member; party_size],
            gold: 0,
            width: 64,
            ground: vec![Some(200); 64],
            spawned: Vec::new(),
            classes: BTreeSet::new(),
            enemy_drops: Vec::new(),
            displaced: Vec::new(),
            settings: None,
            save: None,
            imported: Vec::new(),
            death_metadata_clears: 0,
            seals: 0,
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(100, InventoryLayout::default(), 4)
    }
}

impl HostGame for MemoryHost {
    fn phase(&self) -> Phase {
        self.phase
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn stages(&self) -> &StageRecord {
        &self.stages
    }

    fn stages_mut(&mut self) -> &mut StageRecord {
        &mut self.stages
    }

    fn inventory(&self) -> &InventorySlots {
        &self.inventory
    }

    fn inventory_mut(&mut self) -> &mut InventorySlots {
        &mut self.inventory
    }

    fn party(&self) -> &[PartyMember] {
        &self.party
    }

    fn party_mut(&mut self) -> &mut [PartyMember] {
        &mut self.party
    }

    fn gold(&self) -> u64 {
        self.gold
    }

    fn set_gold(&mut self, gold: u64) {
        self.gold = gold;
    }

    fn stage_width(&self) -> i32 {
        self.width
    }

    fn ground_level(&self, x: i32) -> Option<i32> {
        let column = usize::try_from(x).ok()?;
        self.ground.get(column).copied().flatten()
    }

    fn spawn_enemy(&mut self, spawn: EnemySpawn) {
        self.spawned.push(spawn);
    }

    fn unlock_class(&mut self, class: CharacterClass) {
        self.classes.insert(class);
    }

    fn clear_death_metadata(&mut self) {
        self.death_metadata_clears = self.death_metadata_clears.saturating_add(1);
    }

    fn take_enemy_drops(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.enemy_drops)
    }

    fn take_displaced_equipment(&mut self) -> Vec<SlotItem> {
        std::mem::take(&mut self.displaced)
    }

    fn apply_mod_settings(&mut self, settings: &ModSettings) {
        self.settings = Some(settings.clone());
    }

    fn export_save(&self) -> Option<String> {
        self.save.clone()
    }

    fn import_save(&mut self, save: &str) {
        self.imported.push(save.to_owned());
        self.save = Some(save.to_owned());
    }

    fn seal(&mut self) {
        self.seals = self.seals.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_level_outside_stage_is_none() {
        let mut host = MemoryHost::default();
        host.ground = vec![Some(10), None];
        assert_eq!(host.ground_level(0), Some(10));
        assert_eq!(host.ground_level(1), None);
        assert_eq!(host.ground_level(-4), None);
        assert_eq!(host.ground_level(99), None);
    }

    #[test]
    fn take_drains_pending_drops() {
        let mut host = MemoryHost::default();
        host.enemy_drops = vec![3, 4];
        assert_eq!(host.take_enemy_drops(), vec![3, 4]);
        assert!(host.take_enemy_drops().is_empty());
    }
}
