//! Path resolver (§4.5): turns a `/`-separated path into the directory
//! sector that should hold the final component, plus that component's name
//! — or, for lookups of an existing entry, the resolved inode sector.
//!
//! Grounded on the teacher's `Path::{next_component, resolve_inner,
//! resolve, resolve_parent}` in `fs.rs`. `.` and `..` are not special-cased
//! by this module at all: they are ordinary entries written into every
//! directory at creation time (§4.4), so plain `Directory::lookup` handles
//! them for free.

use std::sync::Arc;

use crate::directory::Directory;
use crate::error::{FsError, FsResult};
use crate::inode::InodeTable;
use crate::param::{NAME_MAX, ROOT_DIR_SECTOR};
use crate::{err, try_log};

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn starting_sector(path: &str, cwd_sector: u32) -> u32 {
    if path.starts_with('/') {
        ROOT_DIR_SECTOR
    } else {
        cwd_sector
    }
}

/// Resolves every component of `path` but the last, returning the sector of
/// the directory that should contain it, and the last component itself.
/// An empty last component (path is `"/"` or `""`) resolves to `"."`.
pub fn resolve_parent(table: &Arc<InodeTable>, path: &str, cwd_sector: u32) -> FsResult<(u32, String)> {
    let mut parts: Vec<&str> = components(path).collect();
    let leaf = parts.pop().unwrap_or(".").to_owned();
    if leaf.len() > NAME_MAX {
        err!(FsError::NameTooLong);
    }

    let mut current = starting_sector(path, cwd_sector);
    for name in parts {
        if name.len() > NAME_MAX {
            err!(FsError::NameTooLong);
        }
        let inode = try_log!(table.open(current));
        let dir = try_log!(Directory::open(inode));
        let next = dir.lookup(name).ok_or(FsError::NoSuchPath);

        let next = match next {
            Ok(sector) => sector,
            Err(e) => {
                dir.close().close();
                err!(e);
            }
        };

        // Open the next component's inode before releasing this one, so a
        // concurrent removal of `current` can't free `next` out from under
        // us in the gap between the lookup and the advance (§4.5).
        let next_inode = match table.open(next) {
            Ok(i) => i,
            Err(e) => {
                dir.close().close();
                err!(e);
            }
        };
        next_inode.close();
        dir.close().close();
        current = next;
    }

    Ok((current, leaf))
}

/// Resolves `path` fully, returning the sector of the inode it names.
pub fn resolve(table: &Arc<InodeTable>, path: &str, cwd_sector: u32) -> FsResult<u32> {
    let (parent_sector, leaf) = try_log!(resolve_parent(table, path, cwd_sector));
    if leaf == "." {
        return Ok(parent_sector);
    }
    let inode = try_log!(table.open(parent_sector));
    let dir = try_log!(Directory::open(inode));
    let found = dir.lookup(&leaf).ok_or(FsError::NoSuchPath);
    dir.close().close();
    found
}
