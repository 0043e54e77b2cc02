use std::io;

use super::store::{Backing, Store};

/// Builder for creating or attaching to a manifold region.
pub struct StoreBuilder {
    name: String,
    backing: Backing,
    slots: usize,
    max_val_sz: usize,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            name: "/slnt_manifold".to_string(),
            backing: Backing::ShmObject,
            slots: 1024,     // Default slot count
            max_val_sz: 256, // Default per-slot value capacity
        }
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backing object name: a "/name" shared-memory object by default, or a
    /// filesystem path after `file_backed()`.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Interpret the name as a regular file path (persistent mode).
    pub fn file_backed(mut self) -> Self {
        self.backing = Backing::File;
        self
    }

    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_max_value_size(mut self, max_val_sz: usize) -> Self {
        self.max_val_sz = max_val_sz;
        self
    }

    /// Create a fresh region; fails if the backing object already exists.
    pub fn create(self) -> io::Result<Store> {
        Store::create(&self.name, self.backing, self.slots, self.max_val_sz)
    }

    /// Attach to an existing region.
    pub fn open(self) -> io::Result<Store> {
        Store::open(&self.name, self.backing)
    }

    /// Attach if the region exists, otherwise create it.
    pub fn open_or_create(self) -> io::Result<Store> {
        match Store::open(&self.name, self.backing) {
            Ok(store) => Ok(store),
            Err(_) => Store::create(&self.name, self.backing, self.slots, self.max_val_sz),
        }
    }

    /// Create the region, attaching instead if something beat us to it.
    pub fn create_or_open(self) -> io::Result<Store> {
        match Store::create(&self.name, self.backing, self.slots, self.max_val_sz) {
            Ok(store) => Ok(store),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Store::open(&self.name, self.backing)
            }
            Err(e) => Err(e),
        }
    }
}
