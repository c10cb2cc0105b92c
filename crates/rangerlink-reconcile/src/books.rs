//! Shop books: randomized prices, scouted contents and scouting targets.
//!
//! Each stage has a book in the town shop. Prices can be randomized once per
//! seed; contents are scouted from the server when the shop opens so the
//! shop can show what a book will send.

use std::collections::BTreeMap;

use rand::Rng;
use rangerlink_types::{
    BookCostMode, BookHint, ItemClassification, LocationId, NetworkHint, Phase, StageFlags,
    StageId, StageRecord,
};
use tracing::debug;

use crate::namespace::{self, IdKind};

/// Stages whose books are never scouted.
pub const EXCLUDED_BOOK_STAGES: [u16; 5] = [0, 20, 47, 70, 77];

/// Draw a price for every stage under `mode`. Vanilla pricing yields an
/// empty map.
pub fn generate_costs<R: Rng>(
    mode: BookCostMode,
    stage_count: usize,
    rng: &mut R,
) -> BTreeMap<StageId, u32> {
    let stages = (0..stage_count).filter_map(|index| u16::try_from(index).ok());
    match mode {
        BookCostMode::Vanilla => BTreeMap::new(),
        BookCostMode::Scaled => stages
            .map(|stage| (StageId(stage), scaled_cost(stage, rng.random::<f64>())))
            .collect(),
        BookCostMode::Random => stages
            .map(|stage| (StageId(stage), rng.random_range(1..=99_999)))
            .collect(),
        BookCostMode::Chaos => stages
            .map(|stage| (StageId(stage), rng.random_range(1..=999_999)))
            .collect(),
    }
}

/// Price between `100 * stage` and `4000 * stage`, skewed low by raising
/// the roll to 1.5. Never below 1.
#[allow(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scaled_cost(stage: u16, roll: f64) -> u32 {
    let min = 100.0 * f64::from(stage);
    let max = 4000.0 * f64::from(stage);
    let scaled = min + roll.powf(1.5) * (max - min);
    // Bounded by 4000 * u16::MAX, which fits in u32.
    (scaled.floor() as u32).max(1)
}

/// Known book contents and prices for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookLedger {
    hints: BTreeMap<StageId, BookHint>,
    costs: BTreeMap<StageId, u32>,
    in_shop: bool,
}

impl BookLedger {
    /// Restore persisted hints and costs.
    pub const fn restore(hints: BTreeMap<StageId, BookHint>, costs: BTreeMap<StageId, u32>) -> Self {
        Self {
            hints,
            costs,
            in_shop: false,
        }
    }

    /// Recorded hints by stage.
    pub const fn hints(&self) -> &BTreeMap<StageId, BookHint> {
        &self.hints
    }

    /// Randomized prices by stage.
    pub const fn costs(&self) -> &BTreeMap<StageId, u32> {
        &self.costs
    }

    /// Generate prices if none are stored yet. Returns `true` if new prices
    /// were drawn.
    pub fn ensure_costs<R: Rng>(&mut self, mode: BookCostMode, stage_count: usize, rng: &mut R) -> bool {
        if !self.costs.is_empty() || mode == BookCostMode::Vanilla {
            return false;
        }
        self.costs = generate_costs(mode, stage_count, rng);
        debug!(?mode, stages = self.costs.len(), "book costs generated");
        true
    }

    /// Record scout results that fall in the book range. Returns how many
    /// hints were recorded.
    pub fn record_hints(&mut self, hints: &[NetworkHint]) -> usize {
        let mut recorded: usize = 0;
        for hint in hints {
            if let Some(IdKind::Book(stage)) = namespace::classify_location(hint.location) {
                self.hints.insert(
                    stage,
                    BookHint {
                        player: hint.player.clone(),
                        item: hint.item.clone(),
                        classification: ItemClassification::from_flags(hint.flags),
                    },
                );
                recorded = recorded.saturating_add(1);
            }
        }
        recorded
    }

    /// Book locations worth scouting: beaten, unlocked, not yet booked,
    /// not excluded and not already hinted.
    pub fn scout_targets(&self, stages: &StageRecord) -> Vec<LocationId> {
        let wanted = StageFlags::UNLOCKED | StageFlags::BEATEN;
        stages
            .iter()
            .filter(|(stage, flags)| {
                *flags == wanted
                    && !EXCLUDED_BOOK_STAGES.contains(&stage.0)
                    && !self.hints.contains_key(stage)
            })
            .filter_map(|(stage, _)| namespace::book_location(stage))
            .collect()
    }

    /// Returns scouting targets on the tick the host enters the shop, and
    /// `None` on every other tick.
    pub fn on_phase(&mut self, phase: Phase, stages: &StageRecord) -> Option<Vec<LocationId>> {
        let entering = phase == Phase::SHOP && !self.in_shop;
        self.in_shop = phase == Phase::SHOP;
        if !entering {
            return None;
        }
        Some(self.scout_targets(stages))
    }
}
