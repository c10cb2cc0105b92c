//! Applies the server's item stream to the host exactly once per id.
//!
//! The [`Reconciler`] owns the received log: the set of every item id that
//! has been applied at least once. Applying an id is split in two:
//!
//! - *Idempotent* effects (stage unlocks, class unlocks) are re-applied every
//!   time, so a replay after a save reload restores them.
//! - *Material* effects (inventory grants, traps) happen only the first time
//!   an id is seen. An id already in the log never produces a second one.
//!
//! When the server resends its stream from index zero after a reconnect, the
//! whole batch is first replayed for idempotent effects, then the ids the
//! log has never seen are applied for real.

use std::collections::BTreeSet;

use rand::Rng;
use rangerlink_types::{CharacterClass, ItemBatch, ItemId, SlotItem, StageFlags, StageId};
use tracing::{debug, info, warn};

use crate::host::HostGame;
use crate::inventory::{InventoryAllocator, Placement};
use crate::namespace::{self, IdKind};
use crate::traps::{TrapDispatcher, TrapEffect};

/// Everything an item application may touch, borrowed for one call.
pub struct Effects<'a, H: HostGame + ?Sized, R: Rng> {
    /// The host game.
    pub host: &'a mut H,
    /// Slot allocator for grants.
    pub allocator: &'a mut InventoryAllocator,
    /// Trap gate.
    pub traps: &'a mut TrapDispatcher,
    /// Randomness for trap effects.
    pub rng: &'a mut R,
}

/// What applying a single id did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Application {
    /// A stage unlock was applied. `changed` is false if it was already set.
    StageUnlocked {
        /// The unlocked stage.
        stage: StageId,
        /// Whether the bit was newly set.
        changed: bool,
    },
    /// An inventory item was granted.
    ItemGranted(Placement),
    /// A party class was unlocked.
    ClassUnlocked(CharacterClass),
    /// A trap was handed to the dispatcher; lists effects that fired now.
    TrapDelivered(Vec<TrapEffect>),
    /// A material id seen before; nothing happened.
    Replayed,
    /// A location id or an id outside every range.
    Ignored,
}

/// Result of handling one delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// The batch was recognised as a full-stream replay.
    pub replay: bool,
    /// The batch started past the next expected index.
    pub gap: bool,
    /// Ids applied for the first time.
    pub first_time: usize,
}

/// Owns the received log and applies delivered items.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    received: BTreeSet<ItemId>,
    classes: BTreeSet<CharacterClass>,
    next_index: u64,
}

impl Reconciler {
    /// An empty reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the received log from a snapshot.
    ///
    /// Projections are not touched; call [`rebuild`](Self::rebuild) once the
    /// host is ready.
    pub fn restore(&mut self, received: &[ItemId]) {
        self.received = received.iter().copied().collect();
    }

    /// Every id applied at least once, ascending.
    pub fn received_items(&self) -> Vec<ItemId> {
        self.received.iter().copied().collect()
    }

    /// Whether `id` has been applied before.
    pub fn has_received(&self, id: ItemId) -> bool {
        self.received.contains(&id)
    }

    /// Classes unlocked so far.
    pub const fn unlocked_classes(&self) -> &BTreeSet<CharacterClass> {
        &self.classes
    }

    /// Stream index the next live batch is expected to start at.
    pub const fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Whether `batch` is the server resending its stream from the start.
    ///
    /// A single-item batch at index zero only counts as a replay if that item
    /// is already known; otherwise it is the first item of a fresh stream.
    pub fn is_replay(&self, batch: &ItemBatch) -> bool {
        if batch.start_index != 0 || self.received.is_empty() {
            return false;
        }
        match batch.items.as_slice() {
            [] => false,
            [only] => self.received.contains(only),
            _ => true,
        }
    }

    /// Apply a delivered batch.
    pub fn apply_batch<H, R>(&mut self, batch: &ItemBatch, fx: &mut Effects<'_, H, R>) -> BatchOutcome
    where
        H: HostGame + ?Sized,
        R: Rng,
    {
        let replay = self.is_replay(batch);
        let gap = !replay && batch.start_index > self.next_index;
        if gap {
            warn!(
                expected = self.next_index,
                got = batch.start_index,
                "gap in item stream"
            );
        }

        let mut first_time: usize = 0;
        if replay {
            for id in &batch.items {
                self.apply(*id, false, fx);
            }
            let unseen: Vec<ItemId> = batch
                .items
                .iter()
                .copied()
                .filter(|id| !self.received.contains(id))
                .collect();
            debug!(
                batch = batch.items.len(),
                unseen = unseen.len(),
                "replaying item stream"
            );
            for id in unseen {
                if self.apply(id, true, fx) != Application::Replayed {
                    first_time = first_time.saturating_add(1);
                }
            }
            self.next_index = batch.end_index();
        } else {
            for id in &batch.items {
                let fresh = !self.received.contains(id);
                self.apply(*id, true, fx);
                if fresh {
                    first_time = first_time.saturating_add(1);
                }
            }
            self.next_index = self.next_index.max(batch.end_index());
        }

        if !batch.items.is_empty() {
            fx.host.seal();
        }
        if first_time > 0 {
            info!(first_time, replay, "items received");
        }
        BatchOutcome {
            replay,
            gap,
            first_time,
        }
    }

    /// Apply one id.
    ///
    /// `first` requests material effects; it is ignored for ids already in
    /// the received log, so applying a known id twice is the same as
    /// replaying it.
    pub fn apply<H, R>(&mut self, id: ItemId, first: bool, fx: &mut Effects<'_, H, R>) -> Application
    where
        H: HostGame + ?Sized,
        R: Rng,
    {
        let first = first && self.received.insert(id);
        match namespace::classify_item(id) {
            Some(IdKind::StageUnlock(stage)) => {
                let changed = fx.host.stages_mut().mark(stage, StageFlags::UNLOCKED);
                Application::StageUnlocked { stage, changed }
            }
            Some(IdKind::ClassUnlock(class)) => {
                self.classes.insert(class);
                fx.host.unlock_class(class);
                Application::ClassUnlocked(class)
            }
            Some(IdKind::ItemGrant(index)) if first => {
                let placement = fx
                    .allocator
                    .grant(fx.host.inventory_mut(), SlotItem::plain(index));
                Application::ItemGranted(placement)
            }
            Some(IdKind::Trap(trap)) if first => {
                Application::TrapDelivered(fx.traps.deliver(trap, &mut *fx.host, &mut *fx.rng))
            }
            Some(IdKind::ItemGrant(_) | IdKind::Trap(_)) => Application::Replayed,
            Some(kind) => {
                warn!(%id, ?kind, "location id delivered as an item, ignored");
                Application::Ignored
            }
            None => {
                warn!(%id, "unknown item id, ignored");
                Application::Ignored
            }
        }
    }

    /// Re-apply every logged id's idempotent effects, e.g. after a snapshot
    /// load or save reload.
    pub fn rebuild<H, R>(&mut self, fx: &mut Effects<'_, H, R>)
    where
        H: HostGame + ?Sized,
        R: Rng,
    {
        let logged: Vec<ItemId> = self.received.iter().copied().collect();
        for id in logged {
            self.apply(id, false, fx);
        }
        fx.host.seal();
    }
}
