//! Bit-exact on-disk structures (§6).
//!
//! Grounded on the teacher's `DiskInode`/`Directory` in `fs.rs` and its
//! `mkfs` tool, both of which derive `bytemuck::{Pod, Zeroable}` on
//! `#[repr(C)]` structs and punch them straight into a sector buffer. This
//! crate follows the same pattern, extended with the double-indirect
//! pointer and Pintos-style `removed`/`is_dir` fields `spec.md` calls for.

use bytemuck::{Pod, Zeroable};

use crate::param::{DIRECT_N, INDIRECT_N, INODE_MAGIC, NAME_MAX, SECTOR_SIZE};

/// On-disk inode. Exactly one sector, no padding.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DiskInode {
    pub direct: [u32; DIRECT_N],
    pub indirect: u32,
    pub double_indirect: u32,
    /// Signed byte length; always `>= 0` in practice, kept `i32` to match §3.
    pub length: i32,
    pub magic: u32,
    /// Non-zero iff this inode is a directory.
    pub is_dir: u32,
}

const _: () = assert!(size_of::<DiskInode>() == SECTOR_SIZE);

impl DiskInode {
    pub fn new(length: i32, is_dir: bool) -> Self {
        Self {
            direct: [0; DIRECT_N],
            indirect: 0,
            double_indirect: 0,
            length,
            magic: INODE_MAGIC,
            is_dir: is_dir as u32,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }
}

/// One indirect block: `SECTOR_SIZE / 4` sector pointers, 0 = unallocated.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct IndirectBlock {
    pub ptrs: [u32; INDIRECT_N],
}

const _: () = assert!(size_of::<IndirectBlock>() == SECTOR_SIZE);

impl IndirectBlock {
    pub fn zeroed() -> Self {
        Zeroable::zeroed()
    }
}

/// A directory entry record: `in_use` (1B), `name[NAME_MAX+1]`, `inode_sector` (4B).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DirEntry {
    pub in_use: u8,
    pub name: [u8; NAME_MAX + 1],
    pub inode_sector: u32,
}

const _: () = assert!(size_of::<DirEntry>() == 1 + NAME_MAX + 1 + 4);

impl DirEntry {
    pub const SIZE: usize = size_of::<Self>();

    pub fn free() -> Self {
        Zeroable::zeroed()
    }

    pub fn occupied(name: &str, inode_sector: u32) -> Self {
        let mut entry = Self::free();
        entry.in_use = 1;
        entry.set_name(name);
        entry.inode_sector = inode_sector;
        entry
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..len]).expect("directory entry name is not valid utf8")
    }

    fn set_name(&mut self, name: &str) {
        debug_assert!(name.len() <= NAME_MAX);
        self.name = [0; NAME_MAX + 1];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    pub fn name_matches(&self, name: &str) -> bool {
        self.is_in_use() && self.name_str() == name
    }
}
