//! Compile-time file system parameters.
//!
//! Mirrors the teacher kernel's `param.rs`: a flat module of `pub const`s
//! rather than a runtime configuration object, since every one of these
//! values is baked into the on-disk layout and cannot change after format.

/// Size of a single device sector, in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Sector holding the free-map file's inode.
pub const FREE_MAP_SECTOR: u32 = 0;
/// Sector holding the root directory's inode.
pub const ROOT_DIR_SECTOR: u32 = 1;

/// Number of direct sector pointers in an on-disk inode.
pub const DIRECT_N: usize = 123;
/// Number of pointers held in one indirect block (`SECTOR_SIZE / 4`).
pub const INDIRECT_N: usize = SECTOR_SIZE / 4;

/// Total number of sectors an inode can address (direct + indirect + double-indirect).
pub const MAX_FILE_SECTORS: usize = DIRECT_N + INDIRECT_N + INDIRECT_N * INDIRECT_N;
/// Largest file size the inode layer can address, in bytes.
pub const MAX_FILE_SIZE: usize = MAX_FILE_SECTORS * SECTOR_SIZE;

/// Magic stamped into every valid on-disk inode.
pub const INODE_MAGIC: u32 = 0x494e_4f44;

/// Number of slots in the buffer cache.
pub const NBUF: usize = 64;

/// Maximum directory entry name length, not counting the NUL terminator.
pub const NAME_MAX: usize = 14;
