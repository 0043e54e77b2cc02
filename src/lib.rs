// Module naming follows project convention (Core = host plumbing, Manifold = data plane)
#[allow(non_snake_case)]
pub mod Manifold {
    pub mod Slab {
        pub mod Slab;
        pub mod Slab_impl;
        pub mod layout;
        pub mod ops_impl;
        pub mod signal_impl;
        pub use Slab::{RawValue, SlabMap}; // re-export for stable path
    }
    pub mod Structs {
        pub mod Slab_Structs;
        pub use Slab_Structs::{HeaderSnapshot, IntegerOp, SlotSnapshot, TimeMode}; // re-export for stable path
    }
    mod builder;
    mod store;
    mod tandem;

    pub use builder::StoreBuilder;
    pub use store::{Backing, Store};
    pub use tandem::TANDEM_SEP;
}
#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub mod fnv;
    pub use SharedMemory::{
        attach_file_region, attach_shm_object, create_file_region, create_shm_object,
        unlink_shm_object, RawHandle, SharedMemoryBackend,
    };
}
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}
