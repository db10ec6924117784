//! `fs_core`: the buffer cache, free-sector map, inode, directory, and
//! path-resolution layers of a small teaching file system, plus a
//! `FileSystem` façade tying them together (§1, §4).
//!
//! This crate is deliberately `std`-hosted rather than `no_std`/kernel
//! code: it is the portable core a teaching OS's kernel would link
//! against, factored out so it can be exercised with ordinary `#[test]`s
//! against an in-memory `RamDisk` instead of only inside a booted kernel.

pub mod cache;
pub mod device;
pub mod directory;
pub mod error;
pub mod file;
pub mod freemap;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod param;
pub mod path;

pub use device::{BlockDevice, FileDisk, RamDisk};
pub use error::{FsError, FsResult};
pub use file::File;
pub use fs::FileSystem;
