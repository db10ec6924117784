//! Directory layer (§4.4): a directory is a regular file whose data is an
//! array of `DirEntry` records, always starting with `.` and `..`.
//!
//! Grounded on the teacher's `Directory` in `fs.rs` (`lookup`, `link`,
//! `is_empty`, `is_name_equal`) generalized from xv6's hard-link model to
//! Pintos-style single-parent directories: no link count, just `removed`
//! on the inode and a `..` entry instead of a `parent` field.

use crate::error::{FsError, FsResult};
use crate::freemap::FreeMap;
use crate::inode::{self, Inode, InodeTable};
use crate::layout::DirEntry;
use crate::param::NAME_MAX;
use crate::{err, try_log};

/// A directory, bound to the inode that backs its entry array.
pub struct Directory {
    inode: Inode,
}

impl Directory {
    /// `dir_create`: allocates a fresh inode at `sector` sized for an empty
    /// entry table, then writes `.` (self) and `..` (parent).
    pub fn create(
        table: &std::sync::Arc<InodeTable>,
        cache: &crate::cache::BufferCache,
        free_map: &FreeMap,
        sector: u32,
        parent_sector: u32,
    ) -> FsResult<()> {
        try_log!(inode::create(cache, free_map, sector, 2 * DirEntry::SIZE, true));
        let dir = try_log!(Self::open(try_log!(table.open(sector))));
        try_log!(dir.write_entry(0, &DirEntry::occupied(".", sector)));
        try_log!(dir.write_entry(1, &DirEntry::occupied("..", parent_sector)));
        dir.close().close();
        Ok(())
    }

    /// Wraps `inode` as a `Directory`. Closes `inode` (instead of leaking
    /// its `open_cnt`) if it doesn't actually hold a directory.
    pub fn open(inode: Inode) -> FsResult<Self> {
        if !inode.is_dir() {
            inode.close();
            err!(FsError::NotADirectory);
        }
        Ok(Self { inode })
    }

    pub fn close(self) -> Inode {
        self.inode
    }

    pub fn reopen(&self) -> Inode {
        self.inode.reopen()
    }

    pub fn sector(&self) -> u32 {
        self.inode.sector()
    }

    pub fn is_removed(&self) -> bool {
        self.inode.is_removed()
    }

    fn entry_count(&self) -> usize {
        self.inode.length() / DirEntry::SIZE
    }

    fn read_entry(&self, idx: usize) -> DirEntry {
        let mut bytes = [0u8; DirEntry::SIZE];
        let n = self.inode.read_at(&mut bytes, idx * DirEntry::SIZE);
        debug_assert_eq!(n, DirEntry::SIZE);
        bytemuck::pod_read_unaligned(&bytes)
    }

    fn write_entry(&self, idx: usize, entry: &DirEntry) -> FsResult<()> {
        let n = try_log!(self.inode.write_at(bytemuck::bytes_of(entry), idx * DirEntry::SIZE));
        if n != DirEntry::SIZE {
            err!(FsError::NoSpace);
        }
        Ok(())
    }

    /// `dir_lookup`: linear scan for `name`, returning its backing sector.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        (0..self.entry_count())
            .map(|i| self.read_entry(i))
            .find(|e| e.name_matches(name))
            .map(|e| e.inode_sector)
    }

    /// `dir_add`: rejects duplicates and overlong names, otherwise reuses a
    /// free slot or appends one.
    pub fn add(&self, name: &str, inode_sector: u32) -> FsResult<()> {
        if name.len() > NAME_MAX {
            err!(FsError::NameTooLong);
        }
        if self.lookup(name).is_some() {
            err!(FsError::NameExists);
        }

        let new_entry = DirEntry::occupied(name, inode_sector);
        for i in 0..self.entry_count() {
            if !self.read_entry(i).is_in_use() {
                return self.write_entry(i, &new_entry);
            }
        }
        self.write_entry(self.entry_count(), &new_entry)
    }

    /// `dir_remove`: clears the slot for `name`. Refuses `.` and `..`.
    /// Emptiness of a directory target is the caller's responsibility to
    /// check first (§4.4 removal rules), since checking it requires
    /// opening the target as a `Directory`, which only makes sense when
    /// the caller already knows it is one.
    pub fn remove(&self, name: &str) -> FsResult<u32> {
        if name == "." || name == ".." {
            err!(FsError::NoSuchPath);
        }

        for i in 0..self.entry_count() {
            let entry = self.read_entry(i);
            if entry.name_matches(name) {
                try_log!(self.write_entry(i, &DirEntry::free()));
                return Ok(entry.inode_sector);
            }
        }
        err!(FsError::NoSuchPath)
    }

    /// True iff only `.` and `..` remain in use.
    pub fn is_empty(&self) -> bool {
        (0..self.entry_count())
            .map(|i| self.read_entry(i))
            .filter(|e| e.is_in_use())
            .all(|e| e.name_str() == "." || e.name_str() == "..")
    }

    /// `dir_readdir`: every in-use entry except `.` and `..`, in storage order.
    pub fn readdir(&self) -> Vec<(String, u32)> {
        (0..self.entry_count())
            .map(|i| self.read_entry(i))
            .filter(|e| e.is_in_use())
            .filter(|e| e.name_str() != "." && e.name_str() != "..")
            .map(|e| (e.name_str().to_owned(), e.inode_sector))
            .collect()
    }
}
