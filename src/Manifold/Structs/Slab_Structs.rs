// Plain snapshot structs handed across the API edge

// no atomics here; keep as plain integral types for ABI

use std::io;

use crate::Manifold::Slab::layout::KEY_CAP;

#[cfg(feature = "embeddings")]
use crate::Manifold::Slab::layout::EMBED_DIM;

/// Header state captured with one atomic load per field.
///
/// Fields are independent atomics in the region, so this copy is a set of
/// point samples, not a consistent cut.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct HeaderSnapshot {
    pub magic: u32,
    pub version: u32,
    pub slots: u64,
    pub max_val_sz: u64,
    pub val_sz: u64,
    pub alignment: u32,
    pub epoch: u64,
    pub val_brk: u64,
    pub parse_failures: u64,
    pub last_failure_epoch: u64,
    pub core_flags: u8,
    pub user_flags: u8,
}

/// Seqlock-consistent copy of one slot's metadata.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct SlotSnapshot {
    pub hash: u64,
    pub epoch: u64,
    pub val_off: u64,
    pub val_len: u32,
    pub type_flag: u8,
    pub user_flag: u8,
    pub watcher_mask: u64,
    pub ctime: u64,
    pub atime: u64,
    pub bloom: u64,
    pub key: [u8; KEY_CAP],
    #[cfg(feature = "embeddings")]
    pub embedding: [f32; EMBED_DIM],
}

/// Arithmetic and bitwise operations applicable to BIGUINT slots.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntegerOp {
    And,
    Or,
    Xor,
    /// Unary; the operand is ignored.
    Not,
    Inc,
    Dec,
}

/// Which slot timestamp `set_slot_time` targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TimeMode {
    CTime = 0,
    ATime = 1,
}

impl TimeMode {
    /// Decode an externally supplied mode integer.
    pub fn from_raw(raw: u32) -> io::Result<TimeMode> {
        match raw {
            0 => Ok(TimeMode::CTime),
            1 => Ok(TimeMode::ATime),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unknown time mode {raw}"),
            )),
        }
    }
}
