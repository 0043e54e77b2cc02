// tests/scrub_purge.rs

use slnt_manifold::Manifold::Structs::TimeMode;
use slnt_manifold::Manifold::{Store, StoreBuilder};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

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

/// Read the slot's full value partition through the raw-pointer escape
/// hatch, verifying the epoch token on both sides.
fn partition_bytes(store: &Store, key: &str, span: usize) -> Vec<u8> {
    let view = store.raw_value(key).unwrap();
    assert_eq!(view.epoch % 2, 0, "raw view taken while a writer was active");
    let bytes = unsafe { std::slice::from_raw_parts(view.ptr.as_ptr(), span) }.to_vec();
    assert_eq!(store.slot_epoch(key).unwrap(), view.epoch, "view tore");
    bytes
}

#[test]
fn test_unscrubbed_tails_keep_garbage_until_purge() {
    let (store, path) = file_store("purge", 4, 64);

    store.set("k", &[0xAB; 64]).unwrap();
    store.set("k", &[0xCD; 4]).unwrap();

    // Without scrubbing, the tail still carries the previous payload
    let bytes = partition_bytes(&store, "k", 64);
    assert_eq!(&bytes[..4], &[0xCD; 4]);
    assert_eq!(&bytes[4..], &[0xAB; 60]);

    store.purge();

    let bytes = partition_bytes(&store, "k", 64);
    assert_eq!(&bytes[..4], &[0xCD; 4]);
    assert_eq!(&bytes[4..], &[0u8; 60], "purge must zero the live tail");

    let _ = fs::remove_file(&path);
}

#[test]
fn test_full_scrub_zeroes_at_write_time() {
    let (store, path) = file_store("fullscrub", 4, 64);

    store.set("k", &[0xAB; 64]).unwrap();
    store.set_av(true);
    store.set("k", &[0xCD; 4]).unwrap();

    let bytes = partition_bytes(&store, "k", 64);
    assert_eq!(&bytes[..4], &[0xCD; 4]);
    assert_eq!(&bytes[4..], &[0u8; 60]);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_hybrid_scrub_rounds_to_cache_lines() {
    let (store, path) = file_store("hybrid", 4, 192);

    store.set("k", &[0xAB; 192]).unwrap();
    store.set_hybrid_av();
    store.set("k", &[0xCD; 4]).unwrap();

    // Hybrid zeroes the first round_up(len, 64) bytes only
    let bytes = partition_bytes(&store, "k", 192);
    assert_eq!(&bytes[..4], &[0xCD; 4]);
    assert_eq!(&bytes[4..64], &[0u8; 60]);
    assert_eq!(&bytes[64..], &[0xAB; 128]);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_scrub_flag_coupling() {
    let (store, path) = file_store("flags", 4, 64);

    assert!(!store.get_av());
    assert!(!store.get_hybrid_av());

    store.set_hybrid_av();
    assert!(store.get_av());
    assert!(store.get_hybrid_av());

    // Clearing the master clears hybrid in the same operation
    store.set_av(false);
    assert!(!store.get_av());
    assert!(!store.get_hybrid_av());

    store.set_av(true);
    assert!(store.get_av());
    assert!(!store.get_hybrid_av());

    let _ = fs::remove_file(&path);
}

#[test]
fn test_unset_scrubs_when_enabled() {
    let (store, path) = file_store("unsetscrub", 4, 64);

    store.set("k", &[0xEE; 64]).unwrap();
    store.set_av(true);
    store.unset("k").unwrap();
    store.set_av(false);

    // Rebind one byte without scrubbing: the tail must be the zeros left
    // by the scrubbed unset, not 0xEE garbage
    store.set("k", &[0x11; 1]).unwrap();
    let bytes = partition_bytes(&store, "k", 64);
    assert_eq!(bytes[0], 0x11);
    assert_eq!(&bytes[1..], &[0u8; 63]);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_slot_time_modes() {
    let (store, path) = file_store("times", 4, 64);

    store.set("k", b"v").unwrap();
    store.set_slot_time("k", TimeMode::CTime, 1000, 7).unwrap();
    store.set_slot_time("k", TimeMode::ATime, 2000, 0).unwrap();

    let snap = store.slot_snapshot("k").unwrap();
    assert_eq!(snap.ctime, 993);
    assert_eq!(snap.atime, 2000);

    assert_eq!(TimeMode::from_raw(1).unwrap(), TimeMode::ATime);
    assert_eq!(
        TimeMode::from_raw(2).unwrap_err().kind(),
        ErrorKind::Unsupported
    );

    let _ = fs::remove_file(&path);
}

#[test]
fn test_header_snapshot_reflects_geometry() {
    use slnt_manifold::Manifold::Slab::layout::{
        arena_size, SLAB_MAGIC, SLAB_VERSION,
    };

    let (store, path) = file_store("headersnap", 16, 64);

    let snap = store.header_snapshot();
    assert_eq!(snap.magic, SLAB_MAGIC);
    assert_eq!(snap.version, SLAB_VERSION);
    assert_eq!(snap.slots, 16);
    assert_eq!(snap.max_val_sz, 64);
    assert_eq!(snap.alignment, 64);
    assert_eq!(snap.val_sz as usize, arena_size(16, 64));
    // The bump pointer starts at the expansion reserve
    assert_eq!(snap.val_brk, 1024);
    // Diagnostics counters stay untouched by the core
    assert_eq!(snap.parse_failures, 0);
    assert_eq!(snap.last_failure_epoch, 0);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_user_flag_surfaces() {
    let (store, path) = file_store("userflags", 4, 64);

    store.set_user_flags(0x0F).unwrap();
    assert_eq!(store.user_flags(), 0x0F);
    assert_eq!(
        store.set_user_flags(0x10).unwrap_err().kind(),
        ErrorKind::InvalidInput
    );

    store.set("k", b"v").unwrap();
    store.set_slot_user_flag("k", 0xA5).unwrap();
    assert_eq!(store.slot_user_flag("k").unwrap(), 0xA5);
    assert_eq!(store.slot_snapshot("k").unwrap().user_flag, 0xA5);

    // unset returns the slot's user bits to zero
    store.unset("k").unwrap();
    store.set("k", b"v").unwrap();
    assert_eq!(store.slot_user_flag("k").unwrap(), 0);

    let _ = fs::remove_file(&path);
}
