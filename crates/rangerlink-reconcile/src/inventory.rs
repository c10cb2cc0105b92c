//! Inventory slot allocation for remote grants.
//!
//! Grants go into the first free ordinary slot. When the inventory is full
//! they wait in a FIFO and are placed, oldest first, as slots free up. A
//! second FIFO holds equipment displaced by class swaps; it is always
//! drained ahead of remote grants.
//!
//! Nothing here ever overwrites an occupied slot, and the transient
//! (in-hand) slot is never allocated into.

use std::collections::VecDeque;

use rangerlink_types::{InventorySlots, SlotItem};
use tracing::debug;

/// Where a grant ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Placed directly into this slot.
    Placed(usize),
    /// No free slot (or older grants still waiting); queued.
    Queued,
}

/// FIFO allocator for remote item grants and class-swap leftovers.
#[derive(Debug, Clone, Default)]
pub struct InventoryAllocator {
    grants: VecDeque<SlotItem>,
    class_swap: VecDeque<SlotItem>,
}

impl InventoryAllocator {
    /// An allocator with both queues empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an allocator from persisted queues.
    pub fn restore(pending_grants: Vec<SlotItem>, pending_class_swap: Vec<SlotItem>) -> Self {
        Self {
            grants: pending_grants.into(),
            class_swap: pending_class_swap.into(),
        }
    }

    /// Grant `item`.
    ///
    /// Queued items are flushed first, so a new grant never takes a slot
    /// ahead of an older one.
    pub fn grant(&mut self, inventory: &mut InventorySlots, item: SlotItem) -> Placement {
        self.flush(inventory);
        if self.grants.is_empty() && self.class_swap.is_empty() {
            if let Some(slot) = inventory.first_free_ordinary() {
                if inventory.place(slot, item) {
                    return Placement::Placed(slot);
                }
            }
        }
        debug!(item_id = item.item_id, "inventory full, grant queued");
        self.grants.push_back(item);
        Placement::Queued
    }

    /// Queue equipment displaced by a class swap.
    pub fn enqueue_class_swap(&mut self, items: impl IntoIterator<Item = SlotItem>) {
        self.class_swap.extend(items);
    }

    /// Place as many queued items as there are free slots, class-swap
    /// leftovers first, each queue in FIFO order.
    ///
    /// Returns the number of items placed.
    pub fn flush(&mut self, inventory: &mut InventorySlots) -> usize {
        let mut placed: usize = 0;
        for queue in [&mut self.class_swap, &mut self.grants] {
            while let Some(item) = queue.front().copied() {
                let Some(slot) = inventory.first_free_ordinary() else {
                    return placed;
                };
                if !inventory.place(slot, item) {
                    return placed;
                }
                queue.pop_front();
                placed = placed.saturating_add(1);
            }
        }
        placed
    }

    /// Grants still waiting for a slot, oldest first.
    pub fn pending_grants(&self) -> Vec<SlotItem> {
        self.grants.iter().copied().collect()
    }

    /// Class-swap leftovers still waiting for a slot, oldest first.
    pub fn pending_class_swap(&self) -> Vec<SlotItem> {
        self.class_swap.iter().copied().collect()
    }

    /// Whether both queues are empty.
    pub fn is_idle(&self) -> bool {
        self.grants.is_empty() && self.class_swap.is_empty()
    }
}

/// Holds at most one item pulled out of the transient slot so a save
/// reload or defeat cannot destroy it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StashSlot {
    item: Option<SlotItem>,
}

impl StashSlot {
    /// Rebuild a stash from a persisted value.
    pub const fn restore(item: Option<SlotItem>) -> Self {
        Self { item }
    }

    /// The stashed item, if any.
    pub const fn item(&self) -> Option<SlotItem> {
        self.item
    }

    /// Whether nothing is stashed.
    pub const fn is_empty(&self) -> bool {
        self.item.is_none()
    }

    /// Move the transient slot's item into the stash.
    ///
    /// Does nothing if the stash is already occupied or the transient slot
    /// is empty. Returns `true` if an item was captured.
    pub fn capture(&mut self, inventory: &mut InventorySlots) -> bool {
        if self.item.is_some() {
            return false;
        }
        let transient = inventory.layout().transient;
        match inventory.take(transient) {
            Some(item) => {
                self.item = Some(item);
                true
            }
            None => false,
        }
    }

    /// Put the stashed item into the first free ordinary slot.
    ///
    /// The stash is cleared only if the item was placed. Returns `true` on
    /// success.
    pub fn try_restore(&mut self, inventory: &mut InventorySlots) -> bool {
        let Some(item) = self.item else {
            return false;
        };
        let Some(slot) = inventory.first_free_ordinary() else {
            return false;
        };
        if inventory.place(slot, item) {
            self.item = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use rangerlink_types::InventoryLayout;

    use super::*;

    fn full_inventory() -> InventorySlots {
        let mut inv = InventorySlots::new(InventoryLayout::default());
        let slots: Vec<usize> = inv.ordinary_slots().collect();
        for slot in slots {
            inv.place(slot, SlotItem::plain(1));
        }
        inv
    }

    #[test]
    fn grant_uses_first_free_ordinary_slot() {
        let mut inv = InventorySlots::new(InventoryLayout::default());
        let mut alloc = InventoryAllocator::new();
        assert_eq!(alloc.grant(&mut inv, SlotItem::plain(7)), Placement::Placed(16));
        assert_eq!(alloc.grant(&mut inv, SlotItem::plain(8)), Placement::Placed(17));
    }

    #[test]
    fn grant_never_touches_transient_slot() {
        let mut inv = full_inventory();
        let mut alloc = InventoryAllocator::new();
        assert!(inv.is_free(40));
        assert_eq!(alloc.grant(&mut inv, SlotItem::plain(7)), Placement::Queued);
        assert!(inv.is_free(40));
    }

    #[test]
    fn queued_grants_drain_in_fifo_order() {
        let mut inv = full_inventory();
        let mut alloc = InventoryAllocator::new();
        alloc.grant(&mut inv, SlotItem::plain(7));
        alloc.grant(&mut inv, SlotItem::plain(8));

        inv.take(20);
        assert_eq!(alloc.flush(&mut inv), 1);
        assert_eq!(inv.get(20), Some(SlotItem::plain(7)));
        assert_eq!(alloc.pending_grants(), vec![SlotItem::plain(8)]);
    }

    #[test]
    fn new_grant_waits_behind_queue() {
        let mut inv = full_inventory();
        let mut alloc = InventoryAllocator::new();
        alloc.grant(&mut inv, SlotItem::plain(7));
        alloc.grant(&mut inv, SlotItem::plain(8));

        inv.take(30);
        // The free slot goes to the oldest queued item, not the new grant.
        assert_eq!(alloc.grant(&mut inv, SlotItem::plain(9)), Placement::Queued);
        assert_eq!(inv.get(30), Some(SlotItem::plain(7)));
        assert_eq!(
            alloc.pending_grants(),
            vec![SlotItem::plain(8), SlotItem::plain(9)]
        );
    }

    #[test]
    fn class_swap_items_drain_before_grants() {
        let mut inv = full_inventory();
        let mut alloc = InventoryAllocator::new();
        alloc.grant(&mut inv, SlotItem::plain(7));
        alloc.enqueue_class_swap([SlotItem::plain(50)]);

        inv.take(16);
        alloc.flush(&mut inv);
        assert_eq!(inv.get(16), Some(SlotItem::plain(50)));
        assert_eq!(alloc.pending_grants(), vec![SlotItem::plain(7)]);
        assert!(alloc.pending_class_swap().is_empty());
    }

    #[test]
    fn restore_keeps_queue_order() {
        let alloc = InventoryAllocator::restore(
            vec![SlotItem::plain(1), SlotItem::plain(2)],
            vec![SlotItem::plain(3)],
        );
        assert_eq!(
            alloc.pending_grants(),
            vec![SlotItem::plain(1), SlotItem::plain(2)]
        );
        assert!(!alloc.is_idle());
    }

    #[test]
    fn stash_captures_transient_once() {
        let mut inv = InventorySlots::new(InventoryLayout::default());
        inv.place(40, SlotItem::plain(5));
        let mut stash = StashSlot::default();
        assert!(stash.capture(&mut inv));
        assert!(inv.is_free(40));

        inv.place(40, SlotItem::plain(6));
        assert!(!stash.capture(&mut inv));
        assert_eq!(stash.item(), Some(SlotItem::plain(5)));
        assert_eq!(inv.get(40), Some(SlotItem::plain(6)));
    }

    #[test]
    fn stash_restore_waits_for_free_slot() {
        let mut inv = full_inventory();
        let mut stash = StashSlot::restore(Some(SlotItem::plain(5)));
        assert!(!stash.try_restore(&mut inv));
        assert!(!stash.is_empty());

        inv.take(25);
        assert!(stash.try_restore(&mut inv));
        assert_eq!(inv.get(25), Some(SlotItem::plain(5)));
        assert!(stash.is_empty());
    }
}
