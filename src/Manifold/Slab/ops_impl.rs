use std::io;
use std::marker::PhantomData;
use std::ptr;
use std::ptr::NonNull;
use std::sync::atomic::fence;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use super::layout::{CORE_FLAG_AUTO_SCRUB, CORE_FLAG_HYBRID_SCRUB, TYPE_BIGUINT};
use super::Slab::{RawValue, SlabMap};
use super::Slab_impl::{contended, key_image, not_found};
use crate::Core::fnv::fnv1a_key;
use crate::Manifold::Structs::{HeaderSnapshot, IntegerOp, SlotSnapshot, TimeMode};

#[cfg(feature = "embeddings")]
use super::layout::EMBED_DIM;

/// Decimal numerals are parsed to at most this many leading digits during
/// integer conversion.
const DECIMAL_PARSE_CAP: usize = 15;

impl SlabMap {
    /// Apply an arithmetic or bitwise operation to a BIGUINT slot in place,
    /// returning the post-op value. Unlike `set`, this never re-locates the
    /// payload.
    pub fn integer_op(&self, key: &str, op: IntegerOp, operand: u64) -> io::Result<u64> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        if slot.type_flag.load(Acquire) & TYPE_BIGUINT == 0 {
            return Err(io::Error::from_raw_os_error(libc::EPROTOTYPE));
        }
        let e = self.lock_bound_slot(index, hash, &img)?;
        if slot.type_flag.load(Acquire) & TYPE_BIGUINT == 0 {
            // Re-typed between the gate check and the claim.
            slot.epoch.store(e + 2, Release);
            return Err(io::Error::from_raw_os_error(libc::EPROTOTYPE));
        }

        let off = slot.val_off.load(Acquire) as usize;
        let next = unsafe {
            // Pre-relocation offsets need not be 8-aligned.
            let cell = self.value_ptr(off) as *mut u64;
            let cur = ptr::read_unaligned(cell);
            let next = match op {
                IntegerOp::And => cur & operand,
                IntegerOp::Or => cur | operand,
                IntegerOp::Xor => cur ^ operand,
                IntegerOp::Not => !cur,
                IntegerOp::Inc => cur.wrapping_add(operand),
                IntegerOp::Dec => cur.wrapping_sub(operand),
            };
            ptr::write_unaligned(cell, next);
            next
        };
        fence(Release);
        slot.epoch.store(e + 2, Release);

        self.pulse(slot);
        self.header_ref().epoch.fetch_add(1, Relaxed);
        Ok(next)
    }

    /// Declare the payload type of a slot.
    ///
    /// Requesting BIGUINT widens the payload to a native u64: a short value
    /// is relocated into an 8-aligned cell carved from the arena's expansion
    /// reserve, converting decimal text to its numeric value and anything
    /// else by raw zero-extension. Exhaustion of the reserve fails with
    /// `OutOfMemory` and leaves the slot exactly as it was.
    pub fn set_named_type(&self, key: &str, mask: u8) -> io::Result<()> {
        if mask == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty type mask",
            ));
        }
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let e = self.lock_bound_slot(index, hash, &img)?;
        if mask & TYPE_BIGUINT != 0 {
            let len = slot.val_len.load(Acquire) as usize;
            if len < 8 {
                let new_off = self.header_ref().val_brk.fetch_add(8, AcqRel) as usize;
                if new_off + 8 > self.val_sz {
                    slot.epoch.store(e + 2, Release);
                    return Err(io::Error::new(
                        io::ErrorKind::OutOfMemory,
                        "arena expansion reserve exhausted",
                    ));
                }
                let off = slot.val_off.load(Acquire) as usize;
                let seed = unsafe { self.convert_to_u64(off, len) };
                unsafe {
                    ptr::write_unaligned(self.value_ptr(new_off) as *mut u64, seed);
                }
                slot.val_off.store(new_off as u64, Release);
                slot.val_len.store(8, Release);
            } else if len > 8 {
                slot.val_len.store(8, Release);
            }
        }
        fence(Release);
        slot.type_flag.store(mask, Release);
        slot.epoch.store(e + 2, Release);

        self.pulse(slot);
        self.header_ref().epoch.fetch_add(1, Relaxed);
        Ok(())
    }

    /// Decimal-or-raw widening of an existing short payload.
    ///
    /// # Safety
    /// `off + len` must lie inside the arena and the slot lock must be held.
    unsafe fn convert_to_u64(&self, off: usize, len: usize) -> u64 {
        let src = self.value_ptr(off);
        if len > 0 && (*src).is_ascii_digit() {
            let mut v: u64 = 0;
            for i in 0..len.min(DECIMAL_PARSE_CAP) {
                let b = *src.add(i);
                if !b.is_ascii_digit() {
                    break;
                }
                v = v.wrapping_mul(10).wrapping_add((b - b'0') as u64);
            }
            v
        } else {
            let mut raw = [0u8; 8];
            ptr::copy_nonoverlapping(src, raw.as_mut_ptr(), len.min(8));
            u64::from_ne_bytes(raw)
        }
    }

    /// Stamp `epoch_time - offset` into the slot's ctime or atime.
    ///
    /// Reader-style parity check only; timestamps are single atomic stores
    /// and take no write lock.
    pub fn set_slot_time(
        &self,
        key: &str,
        mode: TimeMode,
        epoch_time: u64,
        offset: u64,
    ) -> io::Result<()> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        if slot.epoch.load(Acquire) & 1 == 1 {
            return Err(contended());
        }
        let stamp = epoch_time.wrapping_sub(offset);
        match mode {
            TimeMode::CTime => slot.ctime.store(stamp, Release),
            TimeMode::ATime => slot.atime.store(stamp, Release),
        }
        Ok(())
    }

    /// Zero-copy escape hatch: a non-owning view of the slot's payload with
    /// the epoch sampled at the same moment. The caller checks `epoch` is
    /// even and re-reads `slot_epoch` after consuming the bytes.
    pub fn raw_value(&self, key: &str) -> io::Result<RawValue<'_>> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let epoch = slot.epoch.load(Acquire);
        let len = slot.val_len.load(Acquire) as usize;
        let off = slot.val_off.load(Acquire) as usize;
        if off + len > self.val_sz {
            return Err(contended());
        }
        // SAFETY: arena_base + off stays inside the mapping per the bound
        // check above.
        let ptr = unsafe { NonNull::new_unchecked(self.value_ptr(off)) };
        Ok(RawValue {
            ptr,
            len,
            epoch,
            _region: PhantomData,
        })
    }

    /// Current seqlock value of the slot bound to `key`; the re-check half
    /// of the `raw_value` contract.
    pub fn slot_epoch(&self, key: &str) -> io::Result<u64> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };
        Ok(slot.epoch.load(Acquire))
    }

    /// One atomic load per field; fields are independent, so the result is a
    /// set of point samples rather than a consistent cut.
    pub fn header_snapshot(&self) -> HeaderSnapshot {
        let h = self.header_ref();
        HeaderSnapshot {
            magic: h.magic,
            version: h.version,
            slots: h.slots,
            max_val_sz: h.max_val_sz,
            val_sz: h.val_sz,
            alignment: h.alignment,
            epoch: h.epoch.load(Acquire),
            val_brk: h.val_brk.load(Acquire),
            parse_failures: h.parse_failures.load(Acquire),
            last_failure_epoch: h.last_failure_epoch.load(Acquire),
            core_flags: h.core_flags.load(Acquire),
            user_flags: h.user_flags.load(Acquire),
        }
    }

    /// Seqlock-consistent copy of every metadata field of the slot bound to
    /// `key`. Retries internally until two consecutive epoch reads agree and
    /// are even.
    pub fn slot_snapshot(&self, key: &str) -> io::Result<SlotSnapshot> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        loop {
            let e1 = slot.epoch.load(Acquire);
            if e1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let snap = SlotSnapshot {
                hash: slot.hash.load(Acquire),
                epoch: e1,
                val_off: slot.val_off.load(Acquire),
                val_len: slot.val_len.load(Acquire),
                type_flag: slot.type_flag.load(Acquire),
                user_flag: slot.user_flag.load(Acquire),
                watcher_mask: slot.watcher_mask.load(Acquire),
                ctime: slot.ctime.load(Acquire),
                atime: slot.atime.load(Acquire),
                bloom: slot.bloom.load(Acquire),
                key: unsafe { (*self.slot_ptr(index)).key },
                #[cfg(feature = "embeddings")]
                embedding: unsafe { (*self.slot_ptr(index)).embedding },
            };
            fence(Acquire);
            if slot.epoch.load(Acquire) == e1 {
                return Ok(snap);
            }
            std::hint::spin_loop();
        }
    }

    /// Publish a fixed-dimension vector into the slot's embedding region.
    /// The embedding area is distinct from the value arena and leaves
    /// `val_off`/`val_len` untouched.
    #[cfg(feature = "embeddings")]
    pub fn set_embedding(&self, key: &str, vec: &[f32; EMBED_DIM]) -> io::Result<()> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let e = self.lock_bound_slot(index, hash, &img)?;
        unsafe {
            ptr::copy_nonoverlapping(
                vec.as_ptr(),
                (*self.slot_ptr(index)).embedding.as_mut_ptr(),
                EMBED_DIM,
            );
        }
        fence(Release);
        slot.epoch.store(e + 2, Release);

        self.pulse(slot);
        self.header_ref().epoch.fetch_add(1, Relaxed);
        Ok(())
    }

    /// Read the slot's embedding vector under the seqlock reader protocol.
    #[cfg(feature = "embeddings")]
    pub fn get_embedding(&self, key: &str, out: &mut [f32; EMBED_DIM]) -> io::Result<()> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };

        let e1 = slot.epoch.load(Acquire);
        if e1 & 1 == 1 {
            return Err(contended());
        }
        unsafe {
            ptr::copy_nonoverlapping(
                (*self.slot_ptr(index)).embedding.as_ptr(),
                out.as_mut_ptr(),
                EMBED_DIM,
            );
        }
        fence(Acquire);
        if slot.epoch.load(Acquire) != e1 {
            return Err(contended());
        }
        Ok(())
    }

    /// Between-burst maintenance: zero every byte not covered by a live
    /// payload. Free slots lose their whole region, occupied slots their
    /// tail. Slots with an active writer are skipped, never waited on.
    pub fn purge(&self) {
        for i in 0..self.slot_count {
            let slot = unsafe { &*self.slot_ptr(i) };
            let e = slot.epoch.load(Acquire);
            if e & 1 == 1 {
                continue;
            }
            if slot.epoch.compare_exchange(e, e + 1, AcqRel, Relaxed).is_err() {
                continue;
            }
            let off = slot.val_off.load(Acquire) as usize;
            let cap = self.region_capacity(off);
            let len = slot.val_len.load(Acquire) as usize;
            unsafe {
                if slot.hash.load(Acquire) == 0 {
                    ptr::write_bytes(self.value_ptr(off), 0, cap);
                } else if len < cap {
                    ptr::write_bytes(self.value_ptr(off + len), 0, cap - len);
                }
            }
            slot.epoch.store(e + 2, Release);
        }
    }

    /// Set or clear the auto-scrub master bit. Clearing the master also
    /// clears the hybrid bit in the same atomic op.
    pub fn set_av(&self, enable: bool) {
        let flags = &self.header_ref().core_flags;
        if enable {
            flags.fetch_or(CORE_FLAG_AUTO_SCRUB, AcqRel);
        } else {
            flags.fetch_and(!(CORE_FLAG_AUTO_SCRUB | CORE_FLAG_HYBRID_SCRUB), AcqRel);
        }
    }

    /// Enable hybrid scrub: master and hybrid bits in one atomic OR.
    pub fn set_hybrid_av(&self) {
        self.header_ref()
            .core_flags
            .fetch_or(CORE_FLAG_AUTO_SCRUB | CORE_FLAG_HYBRID_SCRUB, AcqRel);
    }

    pub fn get_av(&self) -> bool {
        self.header_ref().core_flags.load(Acquire) & CORE_FLAG_AUTO_SCRUB != 0
    }

    pub fn get_hybrid_av(&self) -> bool {
        self.header_ref().core_flags.load(Acquire) & CORE_FLAG_HYBRID_SCRUB != 0
    }

    /// Store the header's four user-defined bits.
    pub fn set_user_flags(&self, bits: u8) -> io::Result<()> {
        if bits & !0x0F != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "user flags occupy the low four bits",
            ));
        }
        self.header_ref().user_flags.store(bits, Release);
        Ok(())
    }

    pub fn user_flags(&self) -> u8 {
        self.header_ref().user_flags.load(Acquire)
    }

    /// Store a slot's eight caller-defined bits.
    pub fn set_slot_user_flag(&self, key: &str, bits: u8) -> io::Result<()> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };
        slot.user_flag.store(bits, Release);
        Ok(())
    }

    pub fn slot_user_flag(&self, key: &str) -> io::Result<u8> {
        let img = key_image(key.as_bytes());
        let hash = fnv1a_key(&img);
        let index = self.find(hash, &img).ok_or_else(not_found)?;
        let slot = unsafe { &*self.slot_ptr(index) };
        Ok(slot.user_flag.load(Acquire))
    }
}
