// The mapped-region view: raw pointers plus cached geometry

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use super::layout::{RegionHeader, Slot};

/// Open-addressed key-value table over one mapped manifold region.
///
/// This is a view: it holds raw pointers into shared memory whose mapping is
/// owned by the `Store` that built it. All coordination happens through the
/// atomics embedded in the region itself, so `&SlabMap` methods are safe to
/// call from any number of threads, in any number of processes, at once.
///
/// ### Concurrency Design:
/// - **Writers**: every mutation claims the target slot's seqlock by CAS-ing
///   its epoch from even to odd. A second writer observing odd either probes
///   elsewhere (`set` on an unbound key) or surfaces `WouldBlock`; the core
///   never retries on the caller's behalf.
/// - **Readers**: copy out the payload between two epoch samples and accept
///   the snapshot only if both are equal and even; a torn read surfaces
///   `WouldBlock` for the caller to retry.
/// - **Commit**: for `set`, storing `hash` is the publication point that
///   makes a slot addressable to other probers.
pub struct SlabMap {
    pub(crate) base: *mut u8,
    pub(crate) header: *mut RegionHeader,
    pub(crate) slots_base: *mut Slot,
    pub(crate) arena_base: *mut u8,
    pub(crate) slot_count: usize,
    pub(crate) max_val_sz: usize,
    /// Total arena bytes, expansion reserve included.
    pub(crate) val_sz: usize,
    /// Arena offset where the expansion reserve begins.
    pub(crate) bump_base: usize,
}

// All shared state is atomic or seqlock-guarded in the mapping itself.
unsafe impl Send for SlabMap {}
unsafe impl Sync for SlabMap {}

/// Zero-copy view of a slot's payload bytes.
///
/// Non-owning: valid only while the region stays mapped and the slot's epoch
/// still equals `epoch`. Consumers re-check `SlabMap::slot_epoch` after
/// reading through `ptr` to detect tearing; no scrub or bounds protection is
/// offered on this path.
pub struct RawValue<'a> {
    pub ptr: NonNull<u8>,
    pub len: usize,
    /// Slot epoch sampled when the view was taken; odd means a writer was
    /// active and the bytes must not be trusted.
    pub epoch: u64,
    pub(crate) _region: PhantomData<&'a ()>,
}

impl SlabMap {
    /// Number of slots in the table.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Per-slot value capacity in bytes.
    pub fn max_value_size(&self) -> usize {
        self.max_val_sz
    }

    /// Total arena size in bytes, expansion reserve included.
    pub fn arena_bytes(&self) -> usize {
        self.val_sz
    }
}

impl fmt::Debug for SlabMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_slab_map(self, f)
    }
}
