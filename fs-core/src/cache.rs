//! Buffer cache (§4.1).
//!
//! Grounded on the teacher's `buf.rs`, whose slot carries its own lock
//! (there, a `SleepLock<BufData>`) alongside a table-wide lock for
//! metadata; this version folds metadata and payload into a single
//! `Mutex<Slot>` per slot instead, because the replacement policy changed
//! from the teacher's LRU list to the clock algorithm §4.1 specifies, and
//! the clock algorithm's lookup→copy race (two lookups of the same sector,
//! one of them a fresh fault-in) is easiest to close by holding exactly one
//! lock for the whole operation, per the concurrency note in §4.1: "hold the
//! per-head lock across lookup→copy so eviction must wait."
//!
//! A per-slot lock alone only keeps two threads from placing a sector into
//! the *same* slot; it doesn't stop two concurrent misses for the same
//! not-yet-resident sector from each scanning past each other and faulting
//! it into two different slots. `miss` below is the coarser lock that
//! closes that gap: the whole "scan again, pick a victim, fault in" path
//! runs under it, so only one fault-in is ever in flight cache-wide.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::BlockDevice;
use crate::param::{NBUF, SECTOR_SIZE};

struct Slot {
    /// Sector resident in this slot, or `-1` if the slot is empty.
    sector: i64,
    valid: bool,
    dirty: bool,
    clock_bit: bool,
    data: [u8; SECTOR_SIZE],
}

impl Slot {
    const fn empty() -> Self {
        Self {
            sector: -1,
            valid: false,
            dirty: false,
            clock_bit: false,
            data: [0u8; SECTOR_SIZE],
        }
    }
}

/// A fixed-count, write-back sector cache with clock replacement.
pub struct BufferCache {
    device: Arc<dyn BlockDevice>,
    slots: Vec<Mutex<Slot>>,
    clock_hand: Mutex<usize>,
    /// Serializes the whole miss path (re-scan, pick a victim, fault in),
    /// so two concurrent misses for the same sector can't each select a
    /// different victim slot and both fault it in.
    miss: Mutex<()>,
}

impl BufferCache {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            slots: (0..NBUF).map(|_| Mutex::new(Slot::empty())).collect(),
            clock_hand: Mutex::new(0),
            miss: Mutex::new(()),
        }
    }

    /// `bc_lookup`: linear scan, returning the slot index holding `sector` if resident.
    pub fn lookup(&self, sector: u32) -> Option<usize> {
        (0..NBUF).find(|&idx| self.slots[idx].lock().unwrap().sector == sector as i64)
    }

    /// Finds or faults in `sector`, returning a guard locked for the whole
    /// lookup-to-copy window. `skip_read_if_fresh` lets a full-sector write
    /// skip reading the old contents (§4.1 "a full-sector write may skip the
    /// read"); reads always pass `false`.
    fn resident(&self, sector: u32, skip_read_if_fresh: bool) -> MutexGuard<'_, Slot> {
        if let Some(guard) = self.find_resident(sector) {
            return guard;
        }

        // Miss: serialize the whole fault-in under one lock, cache-wide, so
        // two threads missing on the same sector can't each pick a
        // different victim slot and fault it in twice (§3, Testable
        // Property 7). Everything from here to the end of the loop body
        // runs with `miss` held.
        let _miss_guard = self.miss.lock().unwrap();

        // Re-check: another thread may have finished faulting `sector` in
        // while we were waiting for `miss`.
        if let Some(guard) = self.find_resident(sector) {
            return guard;
        }

        loop {
            let idx = self.select_victim();
            let mut guard = self.slots[idx].lock().unwrap();

            if guard.sector == sector as i64 {
                guard.clock_bit = true;
                return guard;
            }

            if guard.dirty {
                self.device.write_sector(guard.sector as u32, &guard.data);
                guard.dirty = false;
            }

            guard.sector = sector as i64;
            guard.clock_bit = true;
            guard.valid = false;
            if !skip_read_if_fresh {
                self.device.read_sector(sector, &mut guard.data);
            }
            guard.valid = true;
            return guard;
        }
    }

    /// Linear scan for an already-resident `sector`, bumping its clock bit.
    fn find_resident(&self, sector: u32) -> Option<MutexGuard<'_, Slot>> {
        for idx in 0..NBUF {
            let mut guard = self.slots[idx].lock().unwrap();
            if guard.sector == sector as i64 {
                guard.clock_bit = true;
                return Some(guard);
            }
        }
        None
    }

    /// Clock replacement (§4.1): advance the hand, clearing clock bits,
    /// until an unset one is found. Only inspects `clock_bit` through a
    /// momentary per-slot lock, so it never blocks on device I/O itself.
    fn select_victim(&self) -> usize {
        loop {
            let idx = {
                let mut hand = self.clock_hand.lock().unwrap();
                let i = *hand;
                *hand = (*hand + 1) % NBUF;
                i
            };

            let mut guard = self.slots[idx].lock().unwrap();
            if guard.clock_bit {
                guard.clock_bit = false;
                continue;
            }
            return idx;
        }
    }

    /// `bc_read`: ensure `sector` resident, copy `chunk` bytes out.
    pub fn read(&self, sector: u32, dst: &mut [u8], dst_ofs: usize, chunk: usize, sector_ofs: usize) {
        let guard = self.resident(sector, false);
        dst[dst_ofs..dst_ofs + chunk].copy_from_slice(&guard.data[sector_ofs..sector_ofs + chunk]);
    }

    /// `bc_write`: ensure `sector` resident, copy `chunk` bytes in, mark dirty.
    pub fn write(&self, sector: u32, src: &[u8], src_ofs: usize, chunk: usize, sector_ofs: usize) {
        let full_sector = sector_ofs == 0 && chunk == SECTOR_SIZE;
        let mut guard = self.resident(sector, full_sector);
        guard.data[sector_ofs..sector_ofs + chunk].copy_from_slice(&src[src_ofs..src_ofs + chunk]);
        guard.dirty = true;
    }

    /// `bc_flush_entry` for one slot, if dirty.
    fn flush_slot(&self, idx: usize) {
        let mut guard = self.slots[idx].lock().unwrap();
        if guard.dirty && guard.sector >= 0 {
            self.device.write_sector(guard.sector as u32, &guard.data);
            guard.dirty = false;
        }
    }

    /// `bc_flush_all`, called from `filesys_done` at shutdown.
    pub fn flush_all(&self) {
        for idx in 0..NBUF {
            self.flush_slot(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RamDisk;

    #[test]
    fn read_after_write_round_trips() {
        let cache = BufferCache::new(Arc::new(RamDisk::new(8)));
        let src = [0xABu8; SECTOR_SIZE];
        cache.write(3, &src, 0, SECTOR_SIZE, 0);

        let mut dst = [0u8; SECTOR_SIZE];
        cache.read(3, &mut dst, 0, SECTOR_SIZE, 0);
        assert_eq!(dst, src);
    }

    #[test]
    fn eviction_writes_back_dirty_slot() {
        let device = Arc::new(RamDisk::new(NBUF as u32 + 4));
        let cache = BufferCache::new(device.clone());

        // Dirty one sector, then touch NBUF further distinct sectors so the
        // clock hand must come back around and evict it.
        let payload = [0x42u8; SECTOR_SIZE];
        cache.write(0, &payload, 0, SECTOR_SIZE, 0);

        for s in 1..=NBUF as u32 {
            let mut scratch = [0u8; SECTOR_SIZE];
            cache.read(s, &mut scratch, 0, SECTOR_SIZE, 0);
        }

        let mut on_disk = [0u8; SECTOR_SIZE];
        device.read_sector(0, &mut on_disk);
        assert_eq!(on_disk, payload, "dirty slot must be written back before reuse");
    }

    #[test]
    fn partial_write_preserves_untouched_bytes() {
        let cache = BufferCache::new(Arc::new(RamDisk::new(4)));
        cache.write(0, &[0xFFu8; SECTOR_SIZE], 0, SECTOR_SIZE, 0);
        cache.write(0, &[0x11], 0, 1, 10);

        let mut dst = [0u8; SECTOR_SIZE];
        cache.read(0, &mut dst, 0, SECTOR_SIZE, 0);
        assert_eq!(dst[10], 0x11);
        assert_eq!(dst[9], 0xFF);
        assert_eq!(dst[11], 0xFF);
    }
}
