use std::fmt;

use crate::Manifold::Slab::SlabMap;
use crate::Manifold::Store;

/// Debug function for Store
///
/// Shows the backend opaquely plus the slab view; never dereferences shared
/// state.
pub fn debug_store(store: &Store, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Store")
        .field("shm", &"<opaque>")
        .field("mapped_bytes", &store.backend().size())
        .field("slab", store.slab())
        .finish()
}

/// Debug function for SlabMap
///
/// Safely displays the view's base address and geometry without touching
/// slot contents.
pub fn debug_slab_map(slab: &SlabMap, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SlabMap")
        .field("base", &format_args!("{:p}", slab.base))
        .field("slots", &slab.slot_count())
        .field("max_val_sz", &slab.max_value_size())
        .field("arena_bytes", &slab.arena_bytes())
        .finish_non_exhaustive()
}
