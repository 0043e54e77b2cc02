use std::io;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use super::layout::{Slot, GROUP_COUNT, NO_WATCHER};
use super::Slab::SlabMap;
use super::Slab_impl::{group_out_of_range, key_image, not_found};
use crate::Core::fnv::fnv1a_key;

impl SlabMap {
    /// Commit-time pulse: one increment per watcher-mask bit, one per bloom
    /// label bit routed through `bloom_watches`. A single write may therefore
    /// bump several groups, or the same group more than once; consumers read
    /// deltas as "at least one relevant event".
    pub(crate) fn pulse(&self, slot: &Slot) {
        let h = self.header_ref();
        let mut watchers = slot.watcher_mask.load(Acquire);
        while watchers != 0 {
            let group = watchers.trailing_zeros() as usize;
            h.signal_groups[group].counter.fetch_add(1, Release);
            watchers &= watchers - 1;
        }
        let mut labels = slot.bloom.load(Acquire);
        while labels != 0 {
            let bit = labels.trailing_zeros() as usize;
            let group = h.bloom_watches[bit].load(Acquire);
            if group != NO_WATCHER && (group as usize) < GROUP_COUNT {
                h.signal_groups[group as usize].counter.fetch_add(1, Release);
            }
            labels &= labels - 1;
        }
    }

    /// Arm signal group `group` for every future write to `key`'s slot.
    pub fn watch_register(&self, key: &str, group: u8) -> io::Result<()> {
        if group as usize >= GROUP_COUNT {
            return Err(group_out_of_range(group));
        }
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };
        slot.watcher_mask.fetch_or(1u64 << group, AcqRel);
        Ok(())
    }

    /// Disarm signal group `group` for `key`'s slot.
    pub fn watch_unregister(&self, key: &str, group: u8) -> io::Result<()> {
        if group as usize >= GROUP_COUNT {
            return Err(group_out_of_range(group));
        }
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };
        slot.watcher_mask.fetch_and(!(1u64 << group), AcqRel);
        Ok(())
    }

    /// Route every label bit set in `mask` to signal group `group`.
    /// Overlapping registrations overwrite.
    pub fn watch_label_register(&self, mask: u64, group: u8) -> io::Result<()> {
        if group as usize >= GROUP_COUNT {
            return Err(group_out_of_range(group));
        }
        let h = self.header_ref();
        let mut bits = mask;
        while bits != 0 {
            let bit = bits.trailing_zeros() as usize;
            h.bloom_watches[bit].store(group, Release);
            bits &= bits - 1;
        }
        Ok(())
    }

    /// Restore the label bits in `mask` to the unwatched sentinel.
    pub fn watch_label_unregister(&self, mask: u64) {
        let h = self.header_ref();
        let mut bits = mask;
        while bits != 0 {
            let bit = bits.trailing_zeros() as usize;
            h.bloom_watches[bit].store(NO_WATCHER, Release);
            bits &= bits - 1;
        }
    }

    /// Current pulse counter of a signal group. Monotonically non-decreasing;
    /// consumers detect edges by diffing across calls.
    pub fn get_signal_count(&self, group: u8) -> io::Result<u64> {
        if group as usize >= GROUP_COUNT {
            return Err(group_out_of_range(group));
        }
        Ok(self.header_ref().signal_groups[group as usize]
            .counter
            .load(Acquire))
    }

    /// OR `mask` into the slot's label set. Labels are additive; clearing
    /// means re-creating the slot.
    pub fn set_label(&self, key: &str, mask: u64) -> io::Result<()> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };
        slot.bloom.fetch_or(mask, AcqRel);
        self.header_ref().epoch.fetch_add(1, Relaxed);
        Ok(())
    }
}
