//! Trap delivery, gating and effects.
//!
//! A trap only fires while the host is in an active-play phase. Traps that
//! arrive in menus or on the map wait in a FIFO and fire on the first tick
//! of active play. Entering the defeat phase throws the queue away: traps
//! that were waiting when the party died never fire.
//!
//! Every effect draws its randomness from the caller's RNG, so a seeded
//! `SmallRng` makes a trap fully reproducible.

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;
use rand::seq::SliceRandom;
use rangerlink_types::{InventorySlots, ItemId, Phase, TrapKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::host::{EnemySpawn, HostGame};
use crate::namespace::{self, IdKind};

/// Tunables for trap effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapSettings {
    /// Fewest enemies a spawn trap creates.
    pub spawn_min: u32,
    /// Most enemies a spawn trap creates.
    pub spawn_max: u32,
    /// Lowest enemy id a spawn trap may pick.
    pub enemy_min: u16,
    /// Highest enemy id a spawn trap may pick.
    pub enemy_max: u16,
    /// Enemy ids inside the range that must never be spawned.
    pub denied_enemies: Vec<u16>,
    /// Position attempts per spawned enemy before giving up on it.
    pub spawn_attempts: u32,
    /// Shortest paralysis, in frames.
    pub paralysis_min: u32,
    /// Longest paralysis, in frames.
    pub paralysis_max: u32,
}

impl Default for TrapSettings {
    fn default() -> Self {
        Self {
            spawn_min: 3,
            spawn_max: 10,
            enemy_min: 1,
            enemy_max: 120,
            denied_enemies: Vec::new(),
            spawn_attempts: 16,
            paralysis_min: 120,
            paralysis_max: 300,
        }
    }
}

impl TrapSettings {
    /// Check every range is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidTrapRange`] for an inverted range and
    /// [`ReconcileError::NoSpawnableEnemies`] if the deny list covers the
    /// whole enemy range.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.spawn_min > self.spawn_max {
            return Err(ReconcileError::InvalidTrapRange {
                name: "spawn",
                min: self.spawn_min,
                max: self.spawn_max,
            });
        }
        if self.paralysis_min > self.paralysis_max {
            return Err(ReconcileError::InvalidTrapRange {
                name: "paralysis",
                min: self.paralysis_min,
                max: self.paralysis_max,
            });
        }
        if self.spawnable_enemies().is_empty() {
            return Err(ReconcileError::NoSpawnableEnemies {
                min: self.enemy_min,
                max: self.enemy_max,
            });
        }
        Ok(())
    }

    fn spawnable_enemies(&self) -> Vec<u16> {
        (self.enemy_min..=self.enemy_max)
            .filter(|id| !self.denied_enemies.contains(id))
            .collect()
    }
}

/// What a trap did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapEffect {
    /// Equipment moved, as `(from, to)` slot pairs.
    Unequipped {
        /// Slot moves in the order they happened.
        moves: Vec<(usize, usize)>,
    },
    /// Gold was halved.
    GoldHalved {
        /// Gold before.
        before: u64,
        /// Gold after.
        after: u64,
    },
    /// A party member was killed. `None` if nobody was alive.
    MemberKilled {
        /// Index of the killed member.
        member: Option<usize>,
    },
    /// Living members were paralyzed.
    Paralyzed {
        /// How many members were affected.
        members: usize,
    },
    /// Enemies were spawned.
    EnemiesSpawned {
        /// How many actually spawned.
        count: usize,
    },
    /// A reserved trap id with no effect.
    Reserved(u8),
}

/// Gates traps behind active play and applies them.
#[derive(Debug, Clone)]
pub struct TrapDispatcher {
    settings: TrapSettings,
    queue: VecDeque<TrapKind>,
    last_phase: Phase,
}

impl TrapDispatcher {
    /// A dispatcher with an empty queue.
    pub const fn new(settings: TrapSettings) -> Self {
        Self {
            settings,
            queue: VecDeque::new(),
            last_phase: Phase::TITLE,
        }
    }

    /// Rebuild the queue from persisted trap item ids. Ids outside the trap
    /// range are skipped.
    pub fn restore(&mut self, pending: &[ItemId]) {
        self.queue = pending
            .iter()
            .filter_map(|id| match namespace::classify_item(*id) {
                Some(IdKind::Trap(trap)) => Some(trap),
                _ => None,
            })
            .collect();
    }

    /// Queued traps as item ids, oldest first.
    pub fn pending_items(&self) -> Vec<ItemId> {
        self.queue
            .iter()
            .filter_map(|trap| namespace::trap_item(*trap))
            .collect()
    }

    /// Number of queued traps.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deliver a trap. Fires now if the host is in active play (after any
    /// older queued traps), otherwise queues it.
    ///
    /// Returns every effect that fired.
    pub fn deliver<H, R>(&mut self, trap: TrapKind, host: &mut H, rng: &mut R) -> Vec<TrapEffect>
    where
        H: HostGame + ?Sized,
        R: Rng,
    {
        self.queue.push_back(trap);
        if host.phase().is_active_play() {
            self.drain(host, rng)
        } else {
            debug!(?trap, phase = %host.phase(), "trap queued until active play");
            Vec::new()
        }
    }

    /// Track a phase change. Entering the defeat phase clears the queue.
    ///
    /// Returns the number of dropped traps.
    pub fn observe_phase(&mut self, phase: Phase) -> usize {
        let entered_defeat = phase == Phase::DEFEAT && self.last_phase != Phase::DEFEAT;
        self.last_phase = phase;
        if !entered_defeat || self.queue.is_empty() {
            return 0;
        }
        let dropped = self.queue.len();
        self.queue.clear();
        info!(dropped, "party defeated, pending traps discarded");
        dropped
    }

    /// Fire every queued trap, oldest first, if the host is in active play.
    pub fn drain<H, R>(&mut self, host: &mut H, rng: &mut R) -> Vec<TrapEffect>
    where
        H: HostGame + ?Sized,
        R: Rng,
    {
        if !host.phase().is_active_play() {
            return Vec::new();
        }
        let mut effects = Vec::with_capacity(self.queue.len());
        while let Some(trap) = self.queue.pop_front() {
            let effect = apply(trap, &self.settings, host, rng);
            info!(?trap, ?effect, "trap fired");
            effects.push(effect);
        }
        if !effects.is_empty() {
            host.seal();
        }
        effects
    }
}

/// Apply one trap to the host immediately, ignoring phase gating.
pub fn apply<H, R>(trap: TrapKind, settings: &TrapSettings, host: &mut H, rng: &mut R) -> TrapEffect
where
    H: HostGame + ?Sized,
    R: Rng,
{
    match trap {
        TrapKind::Unequip => TrapEffect::Unequipped {
            moves: unequip(host.inventory_mut(), rng),
        },
        TrapKind::HalveGold => {
            let before = host.gold();
            let after = before.checked_div(2).unwrap_or(0);
            host.set_gold(after);
            TrapEffect::GoldHalved { before, after }
        }
        TrapKind::KillMember => TrapEffect::MemberKilled {
            member: kill_member(host, rng),
        },
        TrapKind::Paralyze => TrapEffect::Paralyzed {
            members: paralyze(host, settings, rng),
        },
        TrapKind::SpawnEnemies => TrapEffect::EnemiesSpawned {
            count: spawn_enemies(host, settings, rng),
        },
        TrapKind::Reserved(offset) => {
            warn!(offset, "reserved trap delivered, no effect assigned");
            TrapEffect::Reserved(offset)
        }
    }
}

fn move_slot(inventory: &mut InventorySlots, from: usize, to: usize) -> bool {
    let Some(item) = inventory.take(from) else {
        return false;
    };
    if inventory.place(to, item) {
        return true;
    }
    inventory.place(from, item);
    false
}

/// Strip equipment into free slots.
///
/// With fewer than four free ordinary slots, one random piece goes to the
/// transient slot (if it is free) and up to one more piece per free slot
/// goes to ordinary storage. With four or more, pieces are taken from each
/// party member in turn until the free slots run out.
fn unequip<R: Rng>(inventory: &mut InventorySlots, rng: &mut R) -> Vec<(usize, usize)> {
    let mut equipped = inventory.equipped_slots();
    let mut empties = inventory.free_ordinary();
    empties.shuffle(rng);
    let mut moves = Vec::new();
    if equipped.is_empty() {
        return moves;
    }

    if empties.len() < 4 {
        let transient = inventory.layout().transient;
        if inventory.is_free(transient) {
            let pick = rng.random_range(0..equipped.len());
            let from = equipped.swap_remove(pick);
            if move_slot(inventory, from, transient) {
                moves.push((from, transient));
            }
        }
        equipped.shuffle(rng);
        for (from, to) in equipped.into_iter().zip(empties) {
            if move_slot(inventory, from, to) {
                moves.push((from, to));
            }
        }
        return moves;
    }

    let mut by_member: BTreeMap<usize, VecDeque<usize>> = BTreeMap::new();
    equipped.shuffle(rng);
    for slot in equipped {
        if let Some(owner) = inventory.owner_of(slot) {
            by_member.entry(owner).or_default().push_back(slot);
        }
    }
    let mut targets = empties.into_iter();
    'rounds: loop {
        let mut moved_this_round = false;
        for slots in by_member.values_mut() {
            let Some(from) = slots.pop_front() else {
                continue;
            };
            let Some(to) = targets.next() else {
                break 'rounds;
            };
            if move_slot(inventory, from, to) {
                moves.push((from, to));
            }
            moved_this_round = true;
        }
        if !moved_this_round {
            break;
        }
    }
    moves
}

fn kill_member<H, R>(host: &mut H, rng: &mut R) -> Option<usize>
where
    H: HostGame + ?Sized,
    R: Rng,
{
    let alive: Vec<usize> = host
        .party()
        .iter()
        .enumerate()
        .filter(|(_, member)| member.is_alive())
        .map(|(index, _)| index)
        .collect();
    if alive.is_empty() {
        return None;
    }
    let index = alive.get(rng.random_range(0..alive.len())).copied()?;
    let member = host.party_mut().get_mut(index)?;
    member.hp = 0;
    Some(index)
}

fn paralyze<H, R>(host: &mut H, settings: &TrapSettings, rng: &mut R) -> usize
where
    H: HostGame + ?Sized,
    R: Rng,
{
    let mut affected: usize = 0;
    for member in host.party_mut().iter_mut().filter(|m| m.is_alive()) {
        let frames = rng.random_range(settings.paralysis_min..=settings.paralysis_max);
        member.paralysis = member.paralysis.max(frames);
        affected = affected.saturating_add(1);
    }
    affected
}

fn spawn_enemies<H, R>(host: &mut H, settings: &TrapSettings, rng: &mut R) -> usize
where
    H: HostGame + ?Sized,
    R: Rng,
{
    let candidates = settings.spawnable_enemies();
    if candidates.is_empty() {
        return 0;
    }
    let wanted = rng.random_range(settings.spawn_min..=settings.spawn_max);
    let width = host.stage_width().max(1);
    let mut spawned: usize = 0;
    for _ in 0..wanted {
        let Some(enemy_id) = candidates.get(rng.random_range(0..candidates.len())).copied() else {
            continue;
        };
        for _ in 0..settings.spawn_attempts {
            let x = rng.random_range(0..width);
            if let Some(y) = host.ground_level(x) {
                host.spawn_enemy(EnemySpawn { enemy_id, x, y });
                spawned = spawned.saturating_add(1);
                break;
            }
        }
    }
    spawned
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rangerlink_types::SlotItem;

    use super::*;
    use crate::host::MemoryHost;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    fn host_in(phase: Phase) -> MemoryHost {
        let mut host = MemoryHost::default();
        host.phase = phase;
        host
    }

    fn fill_ordinary_except(host: &mut MemoryHost, free: usize) {
        let slots: Vec<usize> = host.inventory.ordinary_slots().collect();
        let keep = slots.len().saturating_sub(free);
        for slot in slots.into_iter().take(keep) {
            host.inventory.place(slot, SlotItem::plain(1));
        }
    }

    fn equip_all(host: &mut MemoryHost) {
        for slot in 0..16 {
            host.inventory.place(slot, SlotItem::plain(100));
        }
    }

    #[test]
    fn trap_outside_active_play_is_queued() {
        let mut host = host_in(Phase(2));
        let mut traps = TrapDispatcher::new(TrapSettings::default());
        let fired = traps.deliver(TrapKind::KillMember, &mut host, &mut rng());
        assert!(fired.is_empty());
        assert_eq!(traps.pending(), 1);
        assert!(host.party.iter().all(|m| m.is_alive()));

        host.phase = Phase::STAGE;
        let fired = traps.drain(&mut host, &mut rng());
        assert_eq!(fired.len(), 1);
        assert_eq!(host.party.iter().filter(|m| !m.is_alive()).count(), 1);
    }

    #[test]
    fn trap_in_active_play_fires_immediately() {
        let mut host = host_in(Phase::SHOP);
        host.gold = 101;
        let mut traps = TrapDispatcher::new(TrapSettings::default());
        let fired = traps.deliver(TrapKind::HalveGold, &mut host, &mut rng());
        assert_eq!(fired, vec![TrapEffect::GoldHalved { before: 101, after: 50 }]);
        assert_eq!(traps.pending(), 0);
    }

    #[test]
    fn entering_defeat_discards_queue() {
        let mut host = host_in(Phase::MAP);
        let mut traps = TrapDispatcher::new(TrapSettings::default());
        traps.observe_phase(Phase::MAP);
        traps.deliver(TrapKind::KillMember, &mut host, &mut rng());
        traps.deliver(TrapKind::Paralyze, &mut host, &mut rng());

        assert_eq!(traps.observe_phase(Phase::DEFEAT), 2);
        host.phase = Phase::STAGE;
        traps.observe_phase(Phase::STAGE);
        assert!(traps.drain(&mut host, &mut rng()).is_empty());
        assert!(host.party.iter().all(|m| m.is_alive() && m.paralysis == 0));
    }

    #[test]
    fn pending_traps_round_trip_as_item_ids() {
        let mut host = host_in(Phase::MAP);
        let mut traps = TrapDispatcher::new(TrapSettings::default());
        traps.deliver(TrapKind::SpawnEnemies, &mut host, &mut rng());
        traps.deliver(TrapKind::Reserved(8), &mut host, &mut rng());
        let saved = traps.pending_items();
        assert_eq!(saved, vec![ItemId(13_004), ItemId(13_008)]);

        let mut restored = TrapDispatcher::new(TrapSettings::default());
        restored.restore(&saved);
        assert_eq!(restored.pending(), 2);
    }

    #[test]
    fn unequip_with_no_empties_uses_transient_only() {
        let mut host = host_in(Phase::STAGE);
        equip_all(&mut host);
        fill_ordinary_except(&mut host, 0);
        let moves = unequip(&mut host.inventory, &mut rng());
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].1, 40);
        assert_eq!(host.inventory.equipped_slots().len(), 15);
    }

    #[test]
    fn unequip_with_occupied_transient_and_no_empties_does_nothing() {
        let mut host = host_in(Phase::STAGE);
        equip_all(&mut host);
        fill_ordinary_except(&mut host, 0);
        host.inventory.place(40, SlotItem::plain(9));
        assert!(unequip(&mut host.inventory, &mut rng()).is_empty());
        assert_eq!(host.inventory.get(40), Some(SlotItem::plain(9)));
    }

    #[test]
    fn unequip_with_few_empties_fills_them_and_transient() {
        let mut host = host_in(Phase::STAGE);
        equip_all(&mut host);
        fill_ordinary_except(&mut host, 2);
        let moves = unequip(&mut host.inventory, &mut rng());
        assert_eq!(moves.len(), 3);
        assert!(host.inventory.free_ordinary().is_empty());
        assert!(!host.inventory.is_free(40));
    }

    #[test]
    fn unequip_with_many_empties_round_robins_members() {
        let mut host = host_in(Phase::STAGE);
        equip_all(&mut host);
        fill_ordinary_except(&mut host, 6);
        let moves = unequip(&mut host.inventory, &mut rng());
        assert_eq!(moves.len(), 6);
        assert!(host.inventory.is_free(40));

        let mut per_member = [0_u32; 4];
        for (from, _) in &moves {
            per_member[from / 4] += 1;
        }
        // Six pieces over four members: nobody loses more than two.
        assert!(per_member.iter().all(|count| (1..=2).contains(count)));
    }

    #[test]
    fn kill_member_skips_the_dead() {
        let mut host = host_in(Phase::STAGE);
        for member in host.party.iter_mut().take(3) {
            member.hp = 0;
        }
        assert_eq!(kill_member(&mut host, &mut rng()), Some(3));
        assert_eq!(kill_member(&mut host, &mut rng()), None);
    }

    #[test]
    fn paralyze_respects_configured_range() {
        let mut host = host_in(Phase::STAGE);
        host.party[1].hp = 0;
        let settings = TrapSettings {
            paralysis_min: 50,
            paralysis_max: 60,
            ..TrapSettings::default()
        };
        assert_eq!(paralyze(&mut host, &settings, &mut rng()), 3);
        assert_eq!(host.party[1].paralysis, 0);
        assert!((50..=60).contains(&host.party[0].paralysis));
    }

    #[test]
    fn spawn_avoids_denied_enemies_and_pits() {
        let mut host = host_in(Phase::STAGE);
        host.ground = (0..64).map(|x| (x % 2 == 0).then_some(180)).collect();
        let settings = TrapSettings {
            enemy_min: 10,
            enemy_max: 12,
            denied_enemies: vec![11],
            ..TrapSettings::default()
        };
        let count = spawn_enemies(&mut host, &settings, &mut rng());
        assert!((3..=10).contains(&count));
        assert_eq!(host.spawned.len(), count);
        for spawn in &host.spawned {
            assert_ne!(spawn.enemy_id, 11);
            assert_eq!(spawn.x % 2, 0);
            assert_eq!(spawn.y, 180);
        }
    }

    #[test]
    fn settings_reject_fully_denied_range() {
        let settings = TrapSettings {
            enemy_min: 5,
            enemy_max: 6,
            denied_enemies: vec![5, 6],
            ..TrapSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ReconcileError::NoSpawnableEnemies { .. })
        ));
        assert!(TrapSettings::default().validate().is_ok());
    }

    #[test]
    fn seeded_rng_makes_traps_reproducible() {
        let run = || {
            let mut host = host_in(Phase::STAGE);
            let mut traps = TrapDispatcher::new(TrapSettings::default());
            traps.deliver(TrapKind::SpawnEnemies, &mut host, &mut rng());
            host.spawned
        };
        assert_eq!(run(), run());
    }
}
