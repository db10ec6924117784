//! Open file handle (§4.6): an inode reference plus a private seek cursor.
//!
//! Grounded on the teacher's `File`/`FileInner` in `kernel/file.rs`, minus
//! the reader/writer capability flags the kernel's syscall surface needs —
//! this crate exposes `read`/`write` unconditionally and leaves access
//! control to its caller, per spec.md §4.6's narrower external interface.

use std::sync::Mutex;

use crate::error::FsResult;
use crate::inode::Inode;

/// One open instance of a file; several `File`s may share the same
/// underlying `Inode` (and so the same `open_cnt`), each with its own
/// cursor.
pub struct File {
    inode: Inode,
    pos: Mutex<usize>,
    deny_write_applied: Mutex<bool>,
}

impl File {
    pub fn new(inode: Inode) -> Self {
        Self {
            inode,
            pos: Mutex::new(0),
            deny_write_applied: Mutex::new(false),
        }
    }

    pub fn length(&self) -> usize {
        self.inode.length()
    }

    pub fn tell(&self) -> usize {
        *self.pos.lock().unwrap()
    }

    pub fn seek(&self, pos: usize) {
        *self.pos.lock().unwrap() = pos;
    }

    /// Reads at the cursor, advancing it by the number of bytes actually read.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut pos = self.pos.lock().unwrap();
        let n = self.inode.read_at(buf, *pos);
        *pos += n;
        n
    }

    /// Reads at an explicit offset without touching the cursor.
    pub fn read_at_offset(&self, offset: usize, buf: &mut [u8]) -> usize {
        self.inode.read_at(buf, offset)
    }

    /// Writes at an explicit offset without touching the cursor.
    pub fn write_at_offset(&self, offset: usize, buf: &[u8]) -> usize {
        self.inode.write_at(buf, offset).unwrap_or(0)
    }

    /// Writes at the cursor, advancing it by the number of bytes actually written.
    pub fn write(&self, buf: &[u8]) -> FsResult<usize> {
        let mut pos = self.pos.lock().unwrap();
        let n = self.inode.write_at(buf, *pos)?;
        *pos += n;
        Ok(n)
    }

    /// `file_deny_write`: denies writers to the backing inode for as long
    /// as this handle stays open, idempotently (a second call is a no-op).
    pub fn deny_write(&self) {
        let mut applied = self.deny_write_applied.lock().unwrap();
        if !*applied {
            self.inode.deny_write();
            *applied = true;
        }
    }

    pub fn allow_write(&self) {
        let mut applied = self.deny_write_applied.lock().unwrap();
        if *applied {
            self.inode.allow_write();
            *applied = false;
        }
    }

    /// `file_close`: releases any deny-write this handle still holds, then
    /// closes the underlying inode.
    pub fn close(self) {
        self.allow_write();
        self.inode.close();
    }

    pub fn inode_sector(&self) -> u32 {
        self.inode.sector()
    }
}
