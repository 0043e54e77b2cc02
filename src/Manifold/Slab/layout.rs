// On-region binary layout: header, slot table, value arena.
//
// Everything in this file is mapped shared across unrelated processes, so
// every offset is ABI. Structs are `#[repr(C, align(64))]` with hand-written
// padding; the hot counters each own a full cache line so writers in
// different processes never false-share.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8};

/// Magic number identifying a valid manifold region.
///
/// "SLNT" read as the four little-endian bytes 53 4C 4E 54.
pub const SLAB_MAGIC: u32 = 0x534C_4E54;

/// Current region layout version. `open` rejects anything else.
pub const SLAB_VERSION: u32 = 2;

/// Declared alignment of the layout; also the scrub rounding quantum.
pub const CACHE_LINE: usize = 64;

/// Key capacity in bytes, including the NUL terminator.
pub const KEY_CAP: usize = 64;

/// Number of signal groups, and of bloom-label bits.
pub const GROUP_COUNT: usize = 64;

/// `bloom_watches` entry meaning "no group watches this label bit".
pub const NO_WATCHER: u8 = 0xFF;

/// Fixed per-slot embedding dimension.
#[cfg(feature = "embeddings")]
pub const EMBED_DIM: usize = 768;

// core_flags bits
pub const CORE_FLAG_AUTO_SCRUB: u8 = 1 << 0;
pub const CORE_FLAG_HYBRID_SCRUB: u8 = 1 << 1;

// One-hot type_flag bits. Only BIGUINT is enforced (integer ops); the rest
// are advisory labels carried for the caller.
pub const TYPE_VOID: u8 = 1 << 0;
pub const TYPE_BIGINT: u8 = 1 << 1;
pub const TYPE_BIGUINT: u8 = 1 << 2;
pub const TYPE_JSON: u8 = 1 << 3;
pub const TYPE_BINARY: u8 = 1 << 4;
pub const TYPE_IMGDATA: u8 = 1 << 5;
pub const TYPE_AUDIO: u8 = 1 << 6;
pub const TYPE_VARTEXT: u8 = 1 << 7;

/// One pulse counter on a private cache line.
///
/// Consumers watch a group by diffing `counter` across reads; the value is
/// monotonically non-decreasing for the life of the region.
#[repr(C, align(64))]
pub struct SignalGroup {
    pub counter: AtomicU64,
}

/// The region header at offset 0 of every mapping.
///
/// The identification fields are written once at creation and read-only
/// afterwards. `epoch` and `val_brk` are contended across processes and sit
/// on private cache lines.
#[repr(C, align(64))]
pub struct RegionHeader {
    pub magic: u32,
    pub version: u32,
    pub slots: u64,
    pub max_val_sz: u64,
    pub val_sz: u64,
    pub alignment: u32,
    _pad0: [u8; 28],

    /// Global write counter, bumped (relaxed) on every committed mutation.
    /// A liveness signal, not a total order.
    pub epoch: AtomicU64,
    _pad1: [u8; 56],

    /// Bump pointer into the arena's expansion reserve; grows only.
    pub val_brk: AtomicU64,
    _pad2: [u8; 56],

    /// Diagnostics for external harnesses; the core never writes these.
    pub parse_failures: AtomicU64,
    pub last_failure_epoch: AtomicU64,
    pub core_flags: AtomicU8,
    pub user_flags: AtomicU8,
    _pad3: [u8; 46],

    /// Label-bit to signal-group routing; 0xFF = unwatched.
    pub bloom_watches: [AtomicU8; GROUP_COUNT],

    pub signal_groups: [SignalGroup; GROUP_COUNT],
}

/// One slot of the open-addressed table.
///
/// `epoch` is the per-slot seqlock: odd = writer active, even = quiescent.
/// `hash` doubles as the occupancy flag (0 = free) and, for `set`, its store
/// is the commit that makes the slot addressable.
#[repr(C, align(64))]
pub struct Slot {
    pub hash: AtomicU64,
    pub epoch: AtomicU64,
    /// Byte offset of this slot's payload inside the value arena.
    pub val_off: AtomicU64,
    pub val_len: AtomicU32,
    pub type_flag: AtomicU8,
    /// Eight caller-defined bits.
    pub user_flag: AtomicU8,
    _pad0: [u8; 2],
    /// Bit i set = pulse signal group i at write commit.
    pub watcher_mask: AtomicU64,
    pub ctime: AtomicU64,
    pub atime: AtomicU64,
    /// OR-accumulated label mask.
    pub bloom: AtomicU64,
    /// NUL-terminated key bytes; not consulted while `hash == 0`. Writers
    /// store the full NUL-padded image, so the last byte is always a
    /// terminator.
    pub key: [u8; KEY_CAP],
    #[cfg(feature = "embeddings")]
    pub embedding: [f32; EMBED_DIM],
}

pub const fn round_up(n: usize, to: usize) -> usize {
    (n + to - 1) / to * to
}

/// Byte offset of slot 0 (the header is a fixed-size prefix).
pub const fn slots_offset() -> usize {
    size_of::<RegionHeader>()
}

/// Byte offset of the value arena.
pub const fn arena_offset(slots: usize) -> usize {
    slots_offset() + slots * size_of::<Slot>()
}

/// Arena offset where the expansion reserve begins; 8-aligned so relocated
/// integer cells take native-width access.
pub const fn bump_base(slots: usize, max_val_sz: usize) -> usize {
    round_up(slots * max_val_sz, 8)
}

/// Total arena bytes: the per-slot partitions plus an 8-byte expansion
/// reserve per slot (one integer relocation each).
pub const fn arena_size(slots: usize, max_val_sz: usize) -> usize {
    bump_base(slots, max_val_sz) + slots * 8
}

/// Total mapping size for a region of the given geometry.
pub const fn region_size(slots: usize, max_val_sz: usize) -> usize {
    arena_offset(slots) + arena_size(slots, max_val_sz)
}
