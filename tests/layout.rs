// Layout conformance tests for ABI stability across processes.
// These tests assert sizes, alignments, and field offsets for the mapped
// RegionHeader, Slot, and SignalGroup structures. They also print the
// observed values to aid debugging when a mismatch occurs on a platform.
use memoffset::offset_of;
use slnt_manifold::Manifold::Slab::layout::{
    arena_offset, arena_size, bump_base, region_size, slots_offset, RegionHeader, SignalGroup,
    Slot, CACHE_LINE, GROUP_COUNT, KEY_CAP,
};
use std::mem::{align_of, size_of};

#[test]
fn test_region_header_layout() {
    let size = size_of::<RegionHeader>();
    let align = align_of::<RegionHeader>();
    let off_magic = offset_of!(RegionHeader, magic);
    let off_version = offset_of!(RegionHeader, version);
    let off_slots = offset_of!(RegionHeader, slots);
    let off_max_val_sz = offset_of!(RegionHeader, max_val_sz);
    let off_val_sz = offset_of!(RegionHeader, val_sz);
    let off_alignment = offset_of!(RegionHeader, alignment);
    let off_epoch = offset_of!(RegionHeader, epoch);
    let off_val_brk = offset_of!(RegionHeader, val_brk);
    let off_parse_failures = offset_of!(RegionHeader, parse_failures);
    let off_last_failure = offset_of!(RegionHeader, last_failure_epoch);
    let off_core_flags = offset_of!(RegionHeader, core_flags);
    let off_user_flags = offset_of!(RegionHeader, user_flags);
    let off_bloom_watches = offset_of!(RegionHeader, bloom_watches);
    let off_signal_groups = offset_of!(RegionHeader, signal_groups);

    println!(
        "RegionHeader => size: {size}, align: {align}, offsets: [magic:{off_magic}, version:{off_version}, slots:{off_slots}, max_val_sz:{off_max_val_sz}, val_sz:{off_val_sz}, alignment:{off_alignment}, epoch:{off_epoch}, val_brk:{off_val_brk}, parse_failures:{off_parse_failures}, last_failure_epoch:{off_last_failure}, core_flags:{off_core_flags}, user_flags:{off_user_flags}, bloom_watches:{off_bloom_watches}, signal_groups:{off_signal_groups}]"
    );

    assert_eq!(align, CACHE_LINE);
    assert_eq!(off_magic, 0);
    assert_eq!(off_version, 4);
    assert_eq!(off_slots, 8);
    assert_eq!(off_max_val_sz, 16);
    assert_eq!(off_val_sz, 24);
    assert_eq!(off_alignment, 32);
    // epoch and val_brk each own a full cache line
    assert_eq!(off_epoch, 64);
    assert_eq!(off_val_brk, 128);
    assert_eq!(off_parse_failures, 192);
    assert_eq!(off_last_failure, 200);
    assert_eq!(off_core_flags, 208);
    assert_eq!(off_user_flags, 209);
    assert_eq!(off_bloom_watches, 256);
    assert_eq!(off_signal_groups, 320);
    assert_eq!(size, 320 + GROUP_COUNT * size_of::<SignalGroup>());
    assert_eq!(size % CACHE_LINE, 0);
}

#[test]
fn test_signal_group_layout() {
    // Each pulse counter must occupy exactly one cache line
    assert_eq!(size_of::<SignalGroup>(), CACHE_LINE);
    assert_eq!(align_of::<SignalGroup>(), CACHE_LINE);
}

#[test]
fn test_slot_layout() {
    let size = size_of::<Slot>();
    let align = align_of::<Slot>();
    let off_hash = offset_of!(Slot, hash);
    let off_epoch = offset_of!(Slot, epoch);
    let off_val_off = offset_of!(Slot, val_off);
    let off_val_len = offset_of!(Slot, val_len);
    let off_type_flag = offset_of!(Slot, type_flag);
    let off_user_flag = offset_of!(Slot, user_flag);
    let off_watcher_mask = offset_of!(Slot, watcher_mask);
    let off_ctime = offset_of!(Slot, ctime);
    let off_atime = offset_of!(Slot, atime);
    let off_bloom = offset_of!(Slot, bloom);
    let off_key = offset_of!(Slot, key);

    println!(
        "Slot => size: {size}, align: {align}, offsets: [hash:{off_hash}, epoch:{off_epoch}, val_off:{off_val_off}, val_len:{off_val_len}, type_flag:{off_type_flag}, user_flag:{off_user_flag}, watcher_mask:{off_watcher_mask}, ctime:{off_ctime}, atime:{off_atime}, bloom:{off_bloom}, key:{off_key}]"
    );

    assert_eq!(align, CACHE_LINE);
    assert_eq!(off_hash, 0);
    assert_eq!(off_epoch, 8);
    assert_eq!(off_val_off, 16);
    assert_eq!(off_val_len, 24);
    assert_eq!(off_type_flag, 28);
    assert_eq!(off_user_flag, 29);
    assert_eq!(off_watcher_mask, 32);
    assert_eq!(off_ctime, 40);
    assert_eq!(off_atime, 48);
    assert_eq!(off_bloom, 56);
    assert_eq!(off_key, 64);
    assert_eq!(size % CACHE_LINE, 0);

    #[cfg(not(feature = "embeddings"))]
    assert_eq!(size, 64 + KEY_CAP);

    #[cfg(feature = "embeddings")]
    {
        use slnt_manifold::Manifold::Slab::layout::EMBED_DIM;
        assert_eq!(offset_of!(Slot, embedding), 64 + KEY_CAP);
        assert_eq!(size, 64 + KEY_CAP + EMBED_DIM * size_of::<f32>());
    }
}

#[test]
fn test_region_geometry() {
    let slots = 16;
    let max_val_sz = 64;

    assert_eq!(slots_offset(), size_of::<RegionHeader>());
    assert_eq!(
        arena_offset(slots),
        slots_offset() + slots * size_of::<Slot>()
    );
    // Per-slot partitions, 8-aligned, then one 8-byte expansion cell each
    assert_eq!(bump_base(slots, max_val_sz), 1024);
    assert_eq!(arena_size(slots, max_val_sz), 1024 + slots * 8);
    assert_eq!(
        region_size(slots, max_val_sz),
        arena_offset(slots) + arena_size(slots, max_val_sz)
    );

    // An unaligned per-slot capacity still yields an 8-aligned bump base
    assert_eq!(bump_base(3, 10), 32);
    assert_eq!(arena_size(3, 10), 32 + 24);
}
