use std::fmt;
use std::io;
use std::ops::Deref;

use super::Slab::layout::{region_size, slots_offset, RegionHeader, SLAB_MAGIC, SLAB_VERSION};
use super::Slab::SlabMap;
use crate::Core::SharedMemory::{
    attach_file_region, attach_shm_object, create_file_region, create_shm_object,
    SharedMemoryBackend,
};

/// How the backing object name is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// POSIX shared-memory object ("/name" semantics); gone on reboot.
    ShmObject,
    /// Regular filesystem path; persists as far as the kernel flushes it.
    File,
}

/// An attached manifold region.
///
/// Owns the mapping and derefs to the `SlabMap` data plane, so every
/// operation is available directly on the store. Dropping the store unmaps
/// the region; the backing object persists until unlinked externally.
pub struct Store {
    shm: Box<dyn SharedMemoryBackend>,
    slab: SlabMap,
}

impl Store {
    /// Create a fresh region. Fails with `AlreadyExists` if the backing
    /// object is already present; creation is race-free across processes.
    pub fn create(name: &str, backing: Backing, slots: usize, max_val_sz: usize) -> io::Result<Store> {
        if slots == 0 || max_val_sz == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "slots and max_val_sz must both be non-zero",
            ));
        }
        let total = region_size(slots, max_val_sz);
        let shm = match backing {
            Backing::ShmObject => create_shm_object(name, total)?,
            Backing::File => create_file_region(name, total)?,
        };
        // SAFETY: the mapping was just created at exactly the computed size
        // and no other process can name it yet (O_EXCL).
        let slab = unsafe { SlabMap::from_raw(shm.as_ptr(), slots, max_val_sz) };
        unsafe { slab.init_region() };
        Ok(Store { shm, slab })
    }

    /// Attach to an existing region and verify its identity and geometry.
    pub fn open(name: &str, backing: Backing) -> io::Result<Store> {
        let shm = match backing {
            Backing::ShmObject => attach_shm_object(name)?,
            Backing::File => attach_file_region(name)?,
        };
        if shm.size() < slots_offset() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "backing object smaller than the region header",
            ));
        }
        let header = shm.as_ptr() as *const RegionHeader;
        // SAFETY: the mapping covers at least the header, checked above.
        let (magic, version, slots, max_val_sz, val_sz) = unsafe {
            (
                (*header).magic,
                (*header).version,
                (*header).slots as usize,
                (*header).max_val_sz as usize,
                (*header).val_sz as usize,
            )
        };
        if magic != SLAB_MAGIC || version != SLAB_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid store (magic {magic:#x}, version {version})"),
            ));
        }
        if slots == 0 || max_val_sz == 0 || shm.size() < region_size(slots, max_val_sz) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "region geometry does not match its mapping",
            ));
        }
        // SAFETY: geometry validated against the mapped extent.
        let slab = unsafe { SlabMap::from_raw(shm.as_ptr(), slots, max_val_sz) };
        if val_sz != slab.arena_bytes() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "recorded arena size disagrees with the layout",
            ));
        }
        Ok(Store { shm, slab })
    }

    /// Direct access to the data-plane view.
    pub fn slab(&self) -> &SlabMap {
        &self.slab
    }

    pub(crate) fn backend(&self) -> &dyn SharedMemoryBackend {
        &*self.shm
    }
}

impl Deref for Store {
    type Target = SlabMap;

    fn deref(&self) -> &SlabMap {
        &self.slab
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_store(self, f)
    }
}
