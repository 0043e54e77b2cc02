// tests/allocation_tracking.rs
//
// The data plane operates entirely inside the mapping: once a store is
// attached, set/get must not touch the heap. dhat tests are marked
// #[serial_test::serial] because dhat allows one profiler at a time.
//
// Run with:
//   cargo test --test allocation_tracking -- --nocapture

use slnt_manifold::Manifold::{Store, StoreBuilder};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

static SEQ: AtomicU64 = AtomicU64::new(0);

fn file_store(tag: &str, slots: usize, max_val_sz: usize) -> (Store, PathBuf) {
    let path = std::env::temp_dir().join(format!(
        "slnt_{}_{}_{}.slab",
        tag,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let store = StoreBuilder::new()
        .with_name(path.to_str().unwrap())
        .file_backed()
        .with_slots(slots)
        .with_max_value_size(max_val_sz)
        .create()
        .expect("create store");
    (store, path)
}

#[test]
#[serial_test::serial]
fn test_hot_path_allocations_with_dhat() {
    let _profiler = dhat::Profiler::builder().testing().build();

    let (store, path) = file_store("dhat", 16, 64);
    let mut buf = [0u8; 64];

    // Warm up so one-time costs are excluded from the measurement
    store.set("hot", b"warmup").unwrap();
    store.get("hot", &mut buf).unwrap();

    let before = dhat::HeapStats::get();
    for _ in 0..1000 {
        store.set("hot", b"payload-bytes").unwrap();
        let n = store.get("hot", &mut buf).unwrap();
        assert_eq!(n, 13);
    }
    let after = dhat::HeapStats::get();

    let delta = after.total_blocks - before.total_blocks;
    println!(
        "dhat: total blocks before {} after {} (delta {})",
        before.total_blocks, after.total_blocks, delta
    );
    assert!(
        delta < 100,
        "set/get hot path allocated {delta} blocks over 1000 iterations"
    );

    drop(store);
    let _ = fs::remove_file(&path);
}

#[test]
#[serial_test::serial]
fn test_mapping_cost_with_memory_stats() {
    use memory_stats::memory_stats;

    let before = memory_stats();

    // A 32 MiB arena: mapped in full, paged in lazily
    let (store, path) = file_store("memstats", 1024, 32 * 1024);
    store.set("probe", b"one page of it").unwrap();

    let after = memory_stats();
    if let (Some(before), Some(after)) = (before, after) {
        println!(
            "memory-stats: physical {} -> {} bytes, virtual {} -> {} bytes",
            before.physical_mem, after.physical_mem, before.virtual_mem, after.virtual_mem
        );
    } else {
        println!("memory-stats unavailable on this platform");
    }

    let mut buf = [0u8; 64];
    assert_eq!(store.get("probe", &mut buf).unwrap(), 14);

    drop(store);
    let _ = fs::remove_file(&path);
}
