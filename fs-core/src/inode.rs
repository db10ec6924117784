//! Inode layer (§4.3): on-disk inode format, byte↔sector mapping, growth,
//! and the process-wide open-inode table.
//!
//! Grounded on the teacher's `Inode`/`InodeTable` in `fs.rs`: a table-wide
//! lock over per-entry metadata (there, `ref_count`; here, `open_cnt`,
//! `deny_write_cnt`, `removed`) and a disk inode read/written through the
//! buffer cache. Two things change from the teacher's xv6-style single
//! indirect level: a double-indirect tier is added (spec.md §3/§4.3), and
//! the open-inode table is a `HashMap<sector, ..>` rather than the
//! teacher's fixed `[InodeMeta; NINODE]` array scan, per the explicit
//! re-architecture note in spec.md §9.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::cache::BufferCache;
use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;
use crate::layout::DiskInode;
use crate::param::{DIRECT_N, INDIRECT_N, MAX_FILE_SIZE, SECTOR_SIZE};
use crate::{err, try_log};

/// Where a byte offset's containing sector lives in the inode's sector map (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SectorSlot {
    Direct(usize),
    Indirect(usize),
    DoubleIndirect { l1: usize, l2: usize },
}

fn classify(sector_index: usize) -> Option<SectorSlot> {
    if sector_index < DIRECT_N {
        return Some(SectorSlot::Direct(sector_index));
    }
    let s = sector_index - DIRECT_N;
    if s < INDIRECT_N {
        return Some(SectorSlot::Indirect(s));
    }
    let r = s - INDIRECT_N;
    if r < INDIRECT_N * INDIRECT_N {
        return Some(SectorSlot::DoubleIndirect {
            l1: r / INDIRECT_N,
            l2: r % INDIRECT_N,
        });
    }
    None
}

fn read_ptr(cache: &BufferCache, block_sector: u32, idx: usize) -> u32 {
    let mut bytes = [0u8; 4];
    cache.read(block_sector, &mut bytes, 0, 4, idx * 4);
    u32::from_le_bytes(bytes)
}

fn write_ptr(cache: &BufferCache, block_sector: u32, idx: usize, value: u32) {
    cache.write(block_sector, &value.to_le_bytes(), 0, 4, idx * 4);
}

fn zero_fill_sector(cache: &BufferCache, sector: u32) {
    cache.write(sector, &[0u8; SECTOR_SIZE], 0, SECTOR_SIZE, 0);
}

fn read_header(cache: &BufferCache, sector: u32) -> DiskInode {
    let mut bytes = [0u8; SECTOR_SIZE];
    cache.read(sector, &mut bytes, 0, SECTOR_SIZE, 0);
    bytemuck::pod_read_unaligned(&bytes)
}

fn write_header(cache: &BufferCache, sector: u32, disk: &DiskInode) {
    cache.write(sector, bytemuck::bytes_of(disk), 0, SECTOR_SIZE, 0);
}

/// Looks up a sector pointer without allocating; 0 means unallocated.
fn existing_sector(cache: &BufferCache, disk: &DiskInode, slot: SectorSlot) -> u32 {
    match slot {
        SectorSlot::Direct(i) => disk.direct[i],
        SectorSlot::Indirect(i) => {
            if disk.indirect == 0 {
                0
            } else {
                read_ptr(cache, disk.indirect, i)
            }
        }
        SectorSlot::DoubleIndirect { l1, l2 } => {
            if disk.double_indirect == 0 {
                return 0;
            }
            let l1_sector = read_ptr(cache, disk.double_indirect, l1);
            if l1_sector == 0 {
                0
            } else {
                read_ptr(cache, l1_sector, l2)
            }
        }
    }
}

/// Allocates and registers a sector for `slot` if it isn't already present,
/// zero-filling any freshly allocated block (the data sector and, on
/// demand, its parent indirect block(s)). Returns the resulting sector.
///
/// If a parent indirect block is freshly allocated but the child
/// allocation then fails, the parent is left in place, empty; a later
/// successful call reuses it (§4.3 Registration).
fn ensure_sector(
    cache: &BufferCache,
    free_map: &FreeMap,
    disk: &mut DiskInode,
    slot: SectorSlot,
) -> FsResult<u32> {
    match slot {
        SectorSlot::Direct(i) => {
            if disk.direct[i] == 0 {
                let sector = try_log!(free_map.allocate(1));
                zero_fill_sector(cache, sector);
                disk.direct[i] = sector;
            }
            Ok(disk.direct[i])
        }
        SectorSlot::Indirect(i) => {
            if disk.indirect == 0 {
                let block = try_log!(free_map.allocate(1));
                zero_fill_sector(cache, block);
                disk.indirect = block;
            }
            let existing = read_ptr(cache, disk.indirect, i);
            if existing != 0 {
                return Ok(existing);
            }
            let sector = try_log!(free_map.allocate(1));
            zero_fill_sector(cache, sector);
            write_ptr(cache, disk.indirect, i, sector);
            Ok(sector)
        }
        SectorSlot::DoubleIndirect { l1, l2 } => {
            if disk.double_indirect == 0 {
                let block = try_log!(free_map.allocate(1));
                zero_fill_sector(cache, block);
                disk.double_indirect = block;
            }
            let mut l1_sector = read_ptr(cache, disk.double_indirect, l1);
            if l1_sector == 0 {
                l1_sector = try_log!(free_map.allocate(1));
                zero_fill_sector(cache, l1_sector);
                write_ptr(cache, disk.double_indirect, l1, l1_sector);
            }
            let existing = read_ptr(cache, l1_sector, l2);
            if existing != 0 {
                return Ok(existing);
            }
            let sector = try_log!(free_map.allocate(1));
            zero_fill_sector(cache, sector);
            write_ptr(cache, l1_sector, l2, sector);
            Ok(sector)
        }
    }
}

/// `inode_update_file_length`: extends `disk`'s backing store from
/// `old_length` to `new_length`, allocating whole sectors on demand and
/// zero-filling, per §4.3 Growth.
fn grow(cache: &BufferCache, free_map: &FreeMap, disk: &mut DiskInode, old_length: usize, new_length: usize) -> FsResult<()> {
    if new_length <= old_length {
        return Ok(());
    }
    if new_length > MAX_FILE_SIZE {
        err!(FsError::OutOfRangeOffset);
    }

    let mut pos = old_length;

    // Extending within the existing tail sector: zero-fill to sector end
    // (or to new_length, if that comes first).
    if pos % SECTOR_SIZE != 0 {
        let sector_start = pos - (pos % SECTOR_SIZE);
        let sector_end = sector_start + SECTOR_SIZE;
        let fill_end = new_length.min(sector_end);
        let slot = try_log!(classify(sector_start / SECTOR_SIZE).ok_or(FsError::OutOfRangeOffset));
        let sector = existing_sector(cache, disk, slot);
        debug_assert_ne!(sector, 0, "tail sector of a nonzero-length file must be allocated");
        let zeros = vec![0u8; fill_end - pos];
        cache.write(sector, &zeros, 0, zeros.len(), pos % SECTOR_SIZE);
        pos = fill_end;
    }

    // Entering new sectors: allocate, zero-fill, register.
    while pos < new_length {
        let slot = try_log!(classify(pos / SECTOR_SIZE).ok_or(FsError::OutOfRangeOffset));
        try_log!(ensure_sector(cache, free_map, disk, slot));
        pos += SECTOR_SIZE;
    }

    Ok(())
}

/// `inode_create`: writes a fresh inode header at `sector` and, if
/// `length > 0`, extends it to `length` via the same growth routine used
/// at runtime.
pub fn create(cache: &BufferCache, free_map: &FreeMap, sector: u32, length: usize, is_dir: bool) -> FsResult<()> {
    let mut disk = DiskInode::new(0, is_dir);
    if length > 0 {
        try_log!(grow(cache, free_map, &mut disk, 0, length));
    }
    disk.length = length as i32;
    write_header(cache, sector, &disk);
    Ok(())
}

/// Releases every sector reachable from the inode header at `sector`,
/// including the indirect/double-indirect header sectors and finally the
/// inode header itself. Used both to unwind a failed `create` and to
/// reclaim a `removed` inode's blocks when its last opener closes it.
pub fn release_all_sectors(cache: &BufferCache, free_map: &FreeMap, sector: u32) {
    let disk = read_header(cache, sector);

    for &d in disk.direct.iter() {
        if d != 0 {
            free_map.release(d, 1);
        }
    }

    if disk.indirect != 0 {
        for i in 0..INDIRECT_N {
            let p = read_ptr(cache, disk.indirect, i);
            if p != 0 {
                free_map.release(p, 1);
            }
        }
        free_map.release(disk.indirect, 1);
    }

    if disk.double_indirect != 0 {
        for l1 in 0..INDIRECT_N {
            let l1_sector = read_ptr(cache, disk.double_indirect, l1);
            if l1_sector == 0 {
                continue;
            }
            for l2 in 0..INDIRECT_N {
                let p = read_ptr(cache, l1_sector, l2);
                if p != 0 {
                    free_map.release(p, 1);
                }
            }
            free_map.release(l1_sector, 1);
        }
        free_map.release(disk.double_indirect, 1);
    }

    free_map.release(sector, 1);
}

struct Bookkeeping {
    open_cnt: u32,
    deny_write_cnt: u32,
    removed: bool,
}

/// The single in-memory record for a sector, shared by every `Inode`
/// handle currently open on it (§3 invariant: at most one per sector).
struct InodeEntry {
    sector: u32,
    book: Mutex<Bookkeeping>,
    /// Held during length extension only (§4.3 write_at step 2), never
    /// across payload copying.
    extend: Mutex<()>,
}

/// Process-wide table of in-memory inodes, keyed by sector number.
pub struct InodeTable {
    cache: Arc<BufferCache>,
    free_map: Arc<OnceLock<FreeMap>>,
    open: Mutex<HashMap<u32, Arc<InodeEntry>>>,
}

impl InodeTable {
    pub fn new(cache: Arc<BufferCache>, free_map: Arc<OnceLock<FreeMap>>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            free_map,
            open: Mutex::new(HashMap::new()),
        })
    }

    fn free_map(&self) -> &FreeMap {
        self.free_map.get().expect("free map not mounted yet")
    }

    /// `inode_open`/`iget`-equivalent: returns the canonical handle for
    /// `sector`, creating the table entry and bumping `open_cnt`.
    pub fn open(self: &Arc<Self>, sector: u32) -> FsResult<Inode> {
        let mut table = self.open.lock().unwrap();
        let entry = table
            .entry(sector)
            .or_insert_with(|| {
                Arc::new(InodeEntry {
                    sector,
                    book: Mutex::new(Bookkeeping {
                        open_cnt: 0,
                        deny_write_cnt: 0,
                        removed: false,
                    }),
                    extend: Mutex::new(()),
                })
            })
            .clone();
        drop(table);

        if entry.book.lock().unwrap().open_cnt == 0 && !read_header(&self.cache, sector).is_valid() {
            // This call inserted the entry and is its only opener; drop it
            // again so a repeated probe of an invalid sector doesn't leak
            // one `InodeEntry` per attempt. Only remove if the table still
            // points at the same entry, in case a concurrent probe already
            // cleaned up and a fresh one has since taken its place.
            let mut table = self.open.lock().unwrap();
            if table.get(&sector).is_some_and(|e| Arc::ptr_eq(e, &entry)) {
                table.remove(&sector);
            }
            drop(table);
            err!(FsError::NoSuchPath);
        }
        entry.book.lock().unwrap().open_cnt += 1;

        Ok(Inode {
            table: self.clone(),
            entry,
        })
    }
}

/// A per-sector in-memory inode handle (§3). Cheap to clone via `reopen`;
/// every clone shares the same `InodeEntry` and thus the same bookkeeping.
pub struct Inode {
    table: Arc<InodeTable>,
    entry: Arc<InodeEntry>,
}

impl Inode {
    pub fn sector(&self) -> u32 {
        self.entry.sector
    }

    fn cache(&self) -> &BufferCache {
        &self.table.cache
    }

    fn free_map(&self) -> &FreeMap {
        self.table.free_map()
    }

    fn header(&self) -> DiskInode {
        read_header(self.cache(), self.sector())
    }

    pub fn is_dir(&self) -> bool {
        self.header().is_dir()
    }

    pub fn length(&self) -> usize {
        self.header().length.max(0) as usize
    }

    /// `reopen`: bumps `open_cnt`, returning another handle to the same entry.
    pub fn reopen(&self) -> Inode {
        self.entry.book.lock().unwrap().open_cnt += 1;
        Inode {
            table: self.table.clone(),
            entry: self.entry.clone(),
        }
    }

    /// `close`: decrements `open_cnt`; at zero, removes the table entry
    /// and, if `removed`, releases every sector the inode owns.
    pub fn close(self) {
        let mut book = self.entry.book.lock().unwrap();
        book.open_cnt -= 1;
        assert!(book.open_cnt < u32::MAX, "inode open_cnt underflow");
        if book.open_cnt > 0 {
            return;
        }
        let removed = book.removed;
        drop(book);

        self.table.open.lock().unwrap().remove(&self.sector());
        if removed {
            release_all_sectors(self.cache(), self.free_map(), self.sector());
        }
    }

    /// Marks the inode `removed`; its blocks are released once the last
    /// opener calls `close`.
    pub fn mark_removed(&self) {
        self.entry.book.lock().unwrap().removed = true;
    }

    pub fn is_removed(&self) -> bool {
        self.entry.book.lock().unwrap().removed
    }

    pub fn deny_write(&self) {
        self.entry.book.lock().unwrap().deny_write_cnt += 1;
    }

    pub fn allow_write(&self) {
        let mut book = self.entry.book.lock().unwrap();
        assert!(book.deny_write_cnt > 0, "allow_write without matching deny_write");
        book.deny_write_cnt -= 1;
    }

    /// `read_at`: walks sectors, stopping at a zero (unallocated) sector or
    /// at end of file, whichever comes first. Returns bytes actually read.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let disk = self.header();
        let length = disk.length.max(0) as usize;
        if offset >= length || buf.is_empty() {
            return 0;
        }
        let want = buf.len().min(length - offset);

        let mut total = 0;
        let mut pos = offset;
        while total < want {
            let Some(slot) = classify(pos / SECTOR_SIZE) else {
                break;
            };
            let sector = existing_sector(self.cache(), &disk, slot);
            if sector == 0 {
                break;
            }
            let sector_ofs = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_ofs).min(want - total);
            self.cache().read(sector, buf, total, chunk, sector_ofs);
            total += chunk;
            pos += chunk;
        }
        total
    }

    /// `write_at`: grows the file under the extension lock if necessary,
    /// then copies payload outside it (§4.3).
    pub fn write_at(&self, buf: &[u8], offset: usize) -> FsResult<usize> {
        if self.entry.book.lock().unwrap().deny_write_cnt > 0 {
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let end = offset + buf.len();
        if end > MAX_FILE_SIZE {
            err!(FsError::OutOfRangeOffset);
        }

        {
            let _extend_guard = self.entry.extend.lock().unwrap();
            let mut disk = self.header();
            let old_length = disk.length.max(0) as usize;
            if end > old_length {
                if grow(self.cache(), self.free_map(), &mut disk, old_length, end).is_err() {
                    // Accept the teaching-OS leak of whatever this call
                    // allocated before failing (§4.3 Open Question).
                    return Ok(0);
                }
                disk.length = end as i32;
                write_header(self.cache(), self.sector(), &disk);
            }
        }

        let disk = self.header();
        let mut total = 0;
        let mut pos = offset;
        while total < buf.len() {
            let slot = classify(pos / SECTOR_SIZE).expect("offset validated against MAX_FILE_SIZE above");
            let sector = existing_sector(self.cache(), &disk, slot);
            debug_assert_ne!(sector, 0, "sector must exist after growth committed the new length");
            let sector_ofs = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_ofs).min(buf.len() - total);
            self.cache().write(sector, buf, total, chunk, sector_ofs);
            total += chunk;
            pos += chunk;
        }
        Ok(total)
    }
}
