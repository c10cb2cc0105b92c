//! Detects local progress and turns it into outbound location checks.
//!
//! The watcher keeps a copy of the stage record from the previous tick and
//! diffs it against the live one. A check fires on the 0 -> 1 transition of a
//! bit, never on the bit being set, so running the diff twice against the
//! same record sends nothing the second time.

use std::collections::BTreeSet;

use rangerlink_types::{LocationId, StageFlags, StageId, StageRecord};
use tracing::{debug, info};

use crate::namespace;

/// Why a check is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// A stage was beaten.
    StageComplete(StageId),
    /// A stage's book was bought.
    Book(StageId),
    /// An enemy type dropped an item for the first time.
    EnemyDrop(u16),
}

/// A location to report to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundCheck {
    /// The location id.
    pub location: LocationId,
    /// What produced it.
    pub kind: CheckKind,
}

impl OutboundCheck {
    fn stage_complete(stage: StageId) -> Option<Self> {
        namespace::stage_complete_location(stage).map(|location| Self {
            location,
            kind: CheckKind::StageComplete(stage),
        })
    }

    fn book(stage: StageId) -> Option<Self> {
        namespace::book_location(stage).map(|location| Self {
            location,
            kind: CheckKind::Book(stage),
        })
    }

    fn enemy_drop(enemy: u16) -> Option<Self> {
        namespace::enemy_drop_location(enemy).map(|location| Self {
            location,
            kind: CheckKind::EnemyDrop(enemy),
        })
    }
}

/// Checks implied by bits that went from clear to set between `prev` and
/// `curr`, in ascending stage order.
///
/// Book checks are only produced when books are shuffled into the pool.
pub fn diff(prev: &StageRecord, curr: &StageRecord, book_shuffle: bool) -> Vec<OutboundCheck> {
    let mut checks = Vec::new();
    for (stage, now) in curr.iter() {
        let before = prev.flags(stage);
        let gained = now.difference(before);
        if gained.contains(StageFlags::BEATEN) {
            checks.extend(OutboundCheck::stage_complete(stage));
        }
        if book_shuffle && gained.contains(StageFlags::BOOKED) {
            checks.extend(OutboundCheck::book(stage));
        }
    }
    checks
}

/// Tick-to-tick progress tracker.
#[derive(Debug, Clone, Default)]
pub struct ProgressWatcher {
    previous: StageRecord,
    sent_enemies: BTreeSet<u16>,
    goal_reported: bool,
}

impl ProgressWatcher {
    /// A watcher whose baseline is `current`, so nothing already set fires.
    pub fn new(current: &StageRecord) -> Self {
        Self {
            previous: current.clone(),
            ..Self::default()
        }
    }

    /// Restore persisted watcher state.
    pub fn restore(&mut self, sent_enemies: &[u16], goal_reported: bool) {
        self.sent_enemies = sent_enemies.iter().copied().collect();
        self.goal_reported = goal_reported;
    }

    /// Replace the baseline without emitting anything.
    pub fn rebase(&mut self, current: &StageRecord) {
        self.previous.clone_from(current);
    }

    /// Diff against the previous tick, then make `current` the new baseline.
    pub fn observe(&mut self, current: &StageRecord, book_shuffle: bool) -> Vec<OutboundCheck> {
        let checks = diff(&self.previous, current, book_shuffle);
        self.previous.clone_from(current);
        if !checks.is_empty() {
            debug!(count = checks.len(), "stage progress detected");
        }
        checks
    }

    /// Checks for enemy types that dropped an item and were never reported.
    pub fn observe_enemy_drops(&mut self, drops: &[u16]) -> Vec<OutboundCheck> {
        let mut checks = Vec::new();
        for enemy in drops {
            if self.sent_enemies.contains(enemy) {
                continue;
            }
            if let Some(check) = OutboundCheck::enemy_drop(*enemy) {
                self.sent_enemies.insert(*enemy);
                checks.push(check);
            }
        }
        checks
    }

    /// Enemy types already reported, ascending.
    pub fn sent_enemies(&self) -> Vec<u16> {
        self.sent_enemies.iter().copied().collect()
    }

    /// Whether the goal has already been reported.
    pub const fn goal_reported(&self) -> bool {
        self.goal_reported
    }

    /// Returns `true` exactly once: the first call where every goal stage is
    /// beaten. An empty goal never completes.
    pub fn check_goal(&mut self, stages: &StageRecord, goal: &[StageId]) -> bool {
        if self.goal_reported || goal.is_empty() {
            return false;
        }
        if goal.iter().all(|stage| stages.has(*stage, StageFlags::BEATEN)) {
            self.goal_reported = true;
            info!(?goal, "goal complete");
            return true;
        }
        false
    }

    /// Every location implied by the current record and the reported enemy
    /// drops, for resending after a connect.
    pub fn resync(&self, stages: &StageRecord, book_shuffle: bool) -> Vec<LocationId> {
        let mut locations: Vec<LocationId> = diff(&StageRecord::default(), stages, book_shuffle)
            .into_iter()
            .map(|check| check.location)
            .collect();
        locations.extend(
            self.sent_enemies
                .iter()
                .filter_map(|enemy| namespace::enemy_drop_location(*enemy)),
        );
        locations
    }
}
