//! Error types for the rangerlink-reconcile crate.
//!
//! The reconciliation logic itself never fails at runtime: unknown ids are
//! logged and ignored, full inventories queue. What can fail is validating
//! the tunables the logic is constructed from.

use rangerlink_types::InventoryLayout;

/// Errors raised when validating reconciliation parameters.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The inventory layout is internally inconsistent.
    #[error("invalid inventory layout {layout:?}: {reason}")]
    InvalidLayout {
        /// The rejected layout.
        layout: InventoryLayout,
        /// What is wrong with it.
        reason: String,
    },

    /// A trap tuning range has its lower bound above its upper bound.
    #[error("invalid trap range {name}: {min} > {max}")]
    InvalidTrapRange {
        /// Which setting.
        name: &'static str,
        /// Configured lower bound.
        min: u32,
        /// Configured upper bound.
        max: u32,
    },

    /// Every enemy id in the spawn range is on the deny list.
    #[error("no spawnable enemies in {min}..={max} after applying the deny list")]
    NoSpawnableEnemies {
        /// Lower bound of the enemy id range.
        min: u16,
        /// Upper bound of the enemy id range.
        max: u16,
    },
}

/// Check that an inventory layout can be allocated into.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidLayout`] when the equipment area does not
/// fit, the transient slot is outside the array, or the member slot count is
/// zero.
pub fn validate_layout(layout: &InventoryLayout) -> Result<(), ReconcileError> {
    let reject = |reason: &str| ReconcileError::InvalidLayout {
        layout: *layout,
        reason: reason.to_owned(),
    };
    if layout.first_ordinary > layout.slot_count {
        return Err(reject("first ordinary slot is past the end of the inventory"));
    }
    if layout.transient >= layout.slot_count {
        return Err(reject("transient slot is past the end of the inventory"));
    }
    if layout.transient < layout.first_ordinary {
        return Err(reject("transient slot overlaps the equipment area"));
    }
    if layout.slots_per_member == 0 {
        return Err(reject("party members need at least one equipment slot"));
    }
    Ok(())
}
