//! Read-slot registry: the synchronization point between readers and the
//! deleter.
//!
//! Readers advertise the graph version they are observing by occupying one
//! of [`READ_SLOTS`](crate::config::READ_SLOTS) single-word slots. Writers
//! bump a monotone version counter on every committed mutation; a node
//! marked dead at version `V` may have its storage recycled only once every
//! occupied slot holds a version greater than `V`. Acquire and release are
//! lock-free single-word updates; when all slots are occupied the acquiring
//! reader yields until one frees.

use crate::config::READ_SLOTS;
use std::sync::atomic::{AtomicU64, Ordering};

/// Slot value meaning "unoccupied". Versions start at 1.
const SLOT_FREE: u64 = 0;

#[derive(Debug)]
pub(crate) struct SlotRegistry {
    slots: [AtomicU64; READ_SLOTS],
}

impl SlotRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU64::new(SLOT_FREE)),
        }
    }

    /// Occupy a slot with `version`. Blocks (yielding) while all slots are
    /// taken; never fails.
    pub(crate) fn acquire(&self, version: u64) -> usize {
        debug_assert_ne!(version, SLOT_FREE);
        loop {
            for (i, slot) in self.slots.iter().enumerate() {
                if slot
                    .compare_exchange(SLOT_FREE, version, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return i;
                }
            }
            std::thread::yield_now();
        }
    }

    pub(crate) fn release(&self, slot: usize) {
        self.slots[slot].store(SLOT_FREE, Ordering::Release);
    }

    /// Smallest version pinned by any occupied slot, or `None` when no
    /// reader is registered.
    pub(crate) fn min_pinned(&self) -> Option<u64> {
        self.slots
            .iter()
            .map(|s| s.load(Ordering::Acquire))
            .filter(|&v| v != SLOT_FREE)
            .min()
    }

    /// True if storage dead since `version` can be recycled: no occupied
    /// slot still pins a version at or below it.
    pub(crate) fn drained_past(&self, version: u64) -> bool {
        self.min_pinned().map_or(true, |m| m > version)
    }
}

/// RAII registration of a reader, returned by
/// [`HnswIndex::acquire_read_slot`](crate::hnsw::HnswIndex::acquire_read_slot).
///
/// While the slot is held, storage of nodes deleted at or after the
/// acquisition version is not recycled. The slot is released on drop.
#[derive(Debug)]
pub struct ReadSlot<'a> {
    registry: &'a SlotRegistry,
    slot: usize,
    version: u64,
}

impl<'a> ReadSlot<'a> {
    pub(crate) fn new(registry: &'a SlotRegistry, version: u64) -> Self {
        let slot = registry.acquire(version);
        Self {
            registry,
            slot,
            version,
        }
    }

    /// Index of the occupied slot.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Graph version observed at acquisition. Every mutation committed
    /// before this version is visible to the holder.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn registry_is(&self, registry: &SlotRegistry) -> bool {
        std::ptr::eq(self.registry, registry)
    }
}

impl Drop for ReadSlot<'_> {
    fn drop(&mut self) {
        self.registry.release(self.slot);
    }
}
