use std::ffi::CStr;
use std::io;
use std::ptr;
use std::sync::atomic::fence;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;

use super::layout::{
    arena_offset, arena_size, bump_base, slots_offset, Slot, CACHE_LINE, CORE_FLAG_AUTO_SCRUB,
    CORE_FLAG_HYBRID_SCRUB, GROUP_COUNT, KEY_CAP, NO_WATCHER, RegionHeader, SLAB_MAGIC,
    SLAB_VERSION, TYPE_VOID, round_up,
};
use super::Slab::SlabMap;
use crate::Core::fnv::fnv1a_key;

/// Cooperative poll granularity.
const POLL_QUANTUM: Duration = Duration::from_millis(10);

/// Fixed-capacity key image: truncated to `KEY_CAP - 1` bytes, NUL-padded to
/// the end. Writers store the whole image, so whole-image equality is the
/// key comparison.
pub(crate) fn key_image(key: &[u8]) -> [u8; KEY_CAP] {
    let mut img = [0u8; KEY_CAP];
    let mut n = 0;
    for &b in key.iter().take(KEY_CAP - 1) {
        if b == 0 {
            break;
        }
        img[n] = b;
        n += 1;
    }
    img
}

pub(crate) fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "key not present")
}

pub(crate) fn contended() -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, "slot writer active")
}

pub(crate) fn group_out_of_range(group: u8) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("signal group {group} outside 0..{GROUP_COUNT}"),
    )
}

impl SlabMap {
    /// Build a view over a mapped region.
    ///
    /// # Safety
    /// `base` must point to a shared, read-write mapping of at least
    /// `region_size(slot_count, max_val_sz)` bytes.
    pub(crate) unsafe fn from_raw(base: *mut u8, slot_count: usize, max_val_sz: usize) -> Self {
        Self {
            base,
            header: base as *mut RegionHeader,
            slots_base: base.add(slots_offset()) as *mut Slot,
            arena_base: base.add(arena_offset(slot_count)),
            slot_count,
            max_val_sz,
            val_sz: arena_size(slot_count, max_val_sz),
            bump_base: bump_base(slot_count, max_val_sz),
        }
    }

    /// Initialize a freshly created region. Creator-only: the mapping is not
    /// yet addressable by any other process.
    ///
    /// # Safety
    /// Caller guarantees exclusive access to a mapping of the full region
    /// size.
    pub(crate) unsafe fn init_region(&self) {
        let h = self.header;
        (*h).magic = SLAB_MAGIC;
        (*h).version = SLAB_VERSION;
        (*h).slots = self.slot_count as u64;
        (*h).max_val_sz = self.max_val_sz as u64;
        (*h).val_sz = self.val_sz as u64;
        (*h).alignment = CACHE_LINE as u32;
        (*h).epoch.store(0, Relaxed);
        (*h).val_brk.store(self.bump_base as u64, Relaxed);
        (*h).core_flags.store(0, Relaxed);
        (*h).user_flags.store(0, Relaxed);
        for watch in (*h).bloom_watches.iter() {
            watch.store(NO_WATCHER, Relaxed);
        }
        for group in (*h).signal_groups.iter() {
            group.counter.store(0, Relaxed);
        }
        for i in 0..self.slot_count {
            let s = self.slot_ptr(i);
            (*s).hash.store(0, Relaxed);
            (*s).epoch.store(0, Relaxed);
            (*s).val_off.store((i * self.max_val_sz) as u64, Relaxed);
            (*s).val_len.store(0, Relaxed);
            (*s).type_flag.store(TYPE_VOID, Relaxed);
            (*s).user_flag.store(0, Relaxed);
            (*s).watcher_mask.store(0, Relaxed);
            (*s).ctime.store(0, Relaxed);
            (*s).atime.store(0, Relaxed);
            (*s).bloom.store(0, Relaxed);
            (*s).key[0] = 0;
        }
    }

    #[inline]
    pub(crate) unsafe fn slot_ptr(&self, index: usize) -> *mut Slot {
        self.slots_base.add(index)
    }

    #[inline]
    pub(crate) fn header_ref(&self) -> &RegionHeader {
        // SAFETY: header points into the live mapping for self's lifetime
        unsafe { &*self.header }
    }

    #[inline]
    pub(crate) unsafe fn value_ptr(&self, off: usize) -> *mut u8 {
        self.arena_base.add(off)
    }

    /// Bytes a slot may legally touch at its current `val_off`: a home
    /// partition spans `max_val_sz`, a relocated bump cell spans 8.
    #[inline]
    pub(crate) fn region_capacity(&self, off: usize) -> usize {
        if off >= self.bump_base {
            8
        } else {
            self.max_val_sz
        }
    }

    /// Whole-image key comparison against the in-slot buffer. A torn key
    /// read is caught by the caller's epoch validation.
    pub(crate) fn key_matches(&self, index: usize, img: &[u8; KEY_CAP]) -> bool {
        let stored = unsafe { &(*self.slot_ptr(index)).key };
        stored == img
    }

    /// Walk the probe sequence for an occupied slot bound to this key.
    /// Probing stops at the first free slot; the iteration bound is the
    /// table size.
    pub(crate) fn find(&self, hash: u64, img: &[u8; KEY_CAP]) -> Option<usize> {
        let start = (hash % self.slot_count as u64) as usize;
        for i in 0..self.slot_count {
            let index = (start + i) % self.slot_count;
            let slot = unsafe { &*self.slot_ptr(index) };
            let h = slot.hash.load(Acquire);
            if h == 0 {
                return None;
            }
            if h == hash && self.key_matches(index, img) {
                return Some(index);
            }
        }
        None
    }

    /// Bind `val` to `key`, claiming a slot on the probe path if the key is
    /// new. Accept condition on the path is: free slot, or hash AND key
    /// bytes both match. Never hash alone, so an emptied earlier probe
    /// position cannot alias a different key.
    pub fn set(&self, key: &str, val: &[u8]) -> io::Result<()> {
        if val.is_empty() || val.len() > self.max_val_sz {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("value length {} outside 1..={}", val.len(), self.max_val_sz),
            ));
        }
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let start = (hash % self.slot_count as u64) as usize;
        let backoff = Backoff::new();

        for i in 0..self.slot_count {
            let index = (start + i) % self.slot_count;
            let slot = unsafe { &*self.slot_ptr(index) };
            let h = slot.hash.load(Acquire);
            let bound = h == hash && self.key_matches(index, &img);
            if h != 0 && !bound {
                continue;
            }

            let e = slot.epoch.load(Acquire);
            if e & 1 == 1 {
                if bound {
                    // The key's own slot has an active writer.
                    return Err(contended());
                }
                // Another writer is claiming this free slot; try the next
                // probe position.
                backoff.spin();
                continue;
            }
            if slot.epoch.compare_exchange(e, e + 1, AcqRel, Relaxed).is_err() {
                if bound {
                    return Err(contended());
                }
                backoff.spin();
                continue;
            }

            // Write lock held. The slot may have changed hands before the
            // CAS landed; re-validate the accept condition.
            let h2 = slot.hash.load(Acquire);
            if !(h2 == 0 || (h2 == hash && self.key_matches(index, &img))) {
                slot.epoch.store(e + 2, Release);
                continue;
            }

            // Set re-homes the payload to the slot's own arena partition
            // (a prior integer relocation may have parked val_off in an
            // 8-byte bump cell).
            let home = index * self.max_val_sz;
            if home + val.len() > self.val_sz {
                slot.epoch.store(e + 2, Release);
                return Err(io::Error::from_raw_os_error(libc::ENOSPC));
            }
            slot.val_off.store(home as u64, Release);
            unsafe {
                self.apply_scrub(home, val.len());
                ptr::copy_nonoverlapping(val.as_ptr(), self.value_ptr(home), val.len());
            }
            slot.val_len.store(val.len() as u32, Release);
            // The type declaration belongs to the previous payload.
            slot.type_flag.store(TYPE_VOID, Relaxed);
            unsafe {
                ptr::copy_nonoverlapping(img.as_ptr(), (*self.slot_ptr(index)).key.as_mut_ptr(), KEY_CAP);
            }
            fence(Release);
            slot.hash.store(hash, Release);
            slot.epoch.store(e + 2, Release);

            self.pulse(slot);
            self.header_ref().epoch.fetch_add(1, Relaxed);
            return Ok(());
        }
        Err(io::Error::from_raw_os_error(libc::ENOSPC))
    }

    /// Scrub policy, evaluated per write from the header flags while the
    /// slot lock is held.
    pub(crate) unsafe fn apply_scrub(&self, off: usize, len: usize) {
        let flags = self.header_ref().core_flags.load(Acquire);
        if flags & CORE_FLAG_AUTO_SCRUB == 0 {
            return;
        }
        let cap = self.region_capacity(off);
        let span = if flags & CORE_FLAG_HYBRID_SCRUB != 0 {
            round_up(len, CACHE_LINE).min(cap)
        } else {
            cap
        };
        ptr::write_bytes(self.value_ptr(off), 0, span);
    }

    /// Copy the value bound to `key` into `buf`, returning the byte count.
    ///
    /// `WouldBlock` marks a torn read and is expected under write pressure;
    /// the caller retries. A too-small `buf` surfaces the EMSGSIZE errno;
    /// `len_of` reports the required size.
    pub fn get(&self, key: &str, buf: &mut [u8]) -> io::Result<usize> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let e1 = slot.epoch.load(Acquire);
        if e1 & 1 == 1 {
            return Err(contended());
        }
        let len = slot.val_len.load(Acquire) as usize;
        let off = slot.val_off.load(Acquire) as usize;
        if off + len > self.val_sz {
            // A stale off/len pair can point past the arena; treat as torn.
            return Err(contended());
        }
        if len > buf.len() {
            fence(Acquire);
            if slot.epoch.load(Acquire) == e1 && slot.hash.load(Acquire) == hash {
                return Err(io::Error::from_raw_os_error(libc::EMSGSIZE));
            }
            return Err(contended());
        }
        unsafe {
            ptr::copy_nonoverlapping(self.value_ptr(off), buf.as_mut_ptr(), len);
        }
        fence(Acquire);
        if slot.epoch.load(Acquire) != e1 {
            return Err(contended());
        }
        Ok(len)
    }

    /// Length-only variant of `get` (the null-buffer form).
    pub fn len_of(&self, key: &str) -> io::Result<usize> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let e1 = slot.epoch.load(Acquire);
        if e1 & 1 == 1 {
            return Err(contended());
        }
        let len = slot.val_len.load(Acquire) as usize;
        fence(Acquire);
        if slot.epoch.load(Acquire) != e1 {
            return Err(contended());
        }
        Ok(len)
    }

    /// Remove the binding for `key`, returning the length it held.
    pub fn unset(&self, key: &str) -> io::Result<usize> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let e = slot.epoch.load(Acquire);
        if e & 1 == 1 {
            return Err(contended());
        }
        if slot.epoch.compare_exchange(e, e + 1, AcqRel, Relaxed).is_err() {
            return Err(contended());
        }
        if slot.hash.load(Acquire) != hash || !self.key_matches(index, &img) {
            // Lost a race with another unset/set; nothing of ours remains.
            slot.epoch.store(e + 2, Release);
            return Err(not_found());
        }

        let old_len = slot.val_len.load(Acquire) as usize;
        let off = slot.val_off.load(Acquire) as usize;

        // Clearing hash first makes the slot unreachable to new probers
        // while the teardown below is still in flight.
        slot.hash.store(0, Release);
        let scrub = self.header_ref().core_flags.load(Acquire) & CORE_FLAG_AUTO_SCRUB != 0;
        unsafe {
            let slot_mut = self.slot_ptr(index);
            if scrub {
                ptr::write_bytes(self.value_ptr(off), 0, self.region_capacity(off));
                ptr::write_bytes((*slot_mut).key.as_mut_ptr(), 0, KEY_CAP);
            } else {
                (*slot_mut).key[0] = 0;
            }
        }
        slot.type_flag.store(TYPE_VOID, Relaxed);
        slot.val_len.store(0, Relaxed);
        slot.val_off.store((index * self.max_val_sz) as u64, Relaxed);
        slot.ctime.store(0, Relaxed);
        slot.atime.store(0, Relaxed);
        slot.user_flag.store(0, Relaxed);
        slot.watcher_mask.store(0, Relaxed);
        slot.bloom.store(0, Relaxed);
        slot.epoch.store(e + 2, Release);

        self.header_ref().epoch.fetch_add(1, Relaxed);
        Ok(old_len)
    }

    /// Best-effort scan of live keys, no locks taken. The handles borrow the
    /// in-mapping key bytes and stay valid while the region is mapped and
    /// the slot occupied; concurrent writers may yield a slightly stale set.
    pub fn list(&self) -> Vec<&CStr> {
        let mut keys = Vec::new();
        for i in 0..self.slot_count {
            let slot = unsafe { &*self.slot_ptr(i) };
            if slot.hash.load(Acquire) == 0 || slot.val_len.load(Acquire) == 0 {
                continue;
            }
            // The key image is NUL-padded, so a terminator is always in range.
            let key = unsafe { CStr::from_ptr((*self.slot_ptr(i)).key.as_ptr().cast()) };
            keys.push(key);
        }
        keys
    }

    /// Cooperatively wait for the slot bound to `key` to commit a write.
    ///
    /// Not a kernel wait: sleeps in coarse quanta up to `timeout_ms`. Odd
    /// epochs surface `WouldBlock`; an epoch change to a new even value is
    /// success; `TimedOut` at the deadline. Event-driven consumers use the
    /// signal arena instead.
    pub fn poll(&self, key: &str, timeout_ms: u64) -> io::Result<()> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let base = slot.epoch.load(Acquire);
        if base & 1 == 1 {
            return Err(contended());
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no write observed"));
            }
            thread::sleep(POLL_QUANTUM.min(deadline - now));
            let e = slot.epoch.load(Acquire);
            if e & 1 == 1 {
                return Err(contended());
            }
            if e != base {
                return Ok(());
            }
        }
    }

    /// Claim the seqlock of an occupied slot bound to `hash`/`img`.
    ///
    /// Returns the pre-claim epoch; the caller must exit with
    /// `epoch.store(e + 2, Release)`. Contention surfaces `WouldBlock`, a
    /// lost identity race `NotFound`.
    pub(crate) fn lock_bound_slot(&self, index: usize, hash: u64, img: &[u8; KEY_CAP]) -> io::Result<u64> {
        let slot = unsafe { &*self.slot_ptr(index) };
        let e = slot.epoch.load(Acquire);
        if e & 1 == 1 {
            return Err(contended());
        }
        if slot.epoch.compare_exchange(e, e + 1, AcqRel, Relaxed).is_err() {
            return Err(contended());
        }
        if slot.hash.load(Acquire) != hash || !self.key_matches(index, img) {
            slot.epoch.store(e + 2, Release);
            return Err(not_found());
        }
        Ok(e)
    }
}
