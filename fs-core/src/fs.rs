//! File system façade (§4.6) and format/mount bootstrap.
//!
//! Grounded on the teacher's top-level `fs_init`/`fs_create`/`fs_open` free
//! functions in `fs.rs`, gathered here behind one `FileSystem` struct with
//! a `file_sys_lock` serializing namespace mutation, per the concurrency
//! model in §5. `format` mirrors Pintos's own bootstrap: the free map's
//! own header and data sectors are carved out by hand, before the map
//! exists as a readable file, so ordinary `FreeMap::allocate` can be used
//! for everything allocated afterward (including the root directory's
//! entry table).

use std::sync::{Arc, Mutex, OnceLock};

use crate::cache::BufferCache;
use crate::device::BlockDevice;
use crate::directory::Directory;
use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::freemap::FreeMap;
use crate::inode::{self, InodeTable};
use crate::layout::DiskInode;
use crate::param::{DIRECT_N, FREE_MAP_SECTOR, ROOT_DIR_SECTOR, SECTOR_SIZE};
use crate::path;
use crate::{err, try_log};

pub struct FileSystem {
    cache: Arc<BufferCache>,
    table: Arc<InodeTable>,
    free_map: Arc<OnceLock<FreeMap>>,
    /// `file_sys_lock` (§5): serializes every operation that mutates the
    /// namespace (create, remove, create_dir) so concurrent callers never
    /// race on the same directory's free-slot scan.
    lock: Mutex<()>,
    cwd: Mutex<u32>,
}

impl FileSystem {
    fn free_map(&self) -> &FreeMap {
        self.free_map.get().expect("free map not mounted")
    }

    /// `filesys_format`: bootstraps a brand-new device, writing the free
    /// map's own header and an empty root directory.
    pub fn format(device: Arc<dyn BlockDevice>) -> FsResult<Self> {
        let cache = Arc::new(BufferCache::new(device.clone()));
        let free_map_cell = Arc::new(OnceLock::new());
        let table = InodeTable::new(cache.clone(), free_map_cell.clone());

        let bit_count = device.sector_count() as usize;
        let byte_len = bit_count.div_ceil(8);
        let bitmap_sectors = byte_len.div_ceil(SECTOR_SIZE);
        assert!(
            bitmap_sectors <= DIRECT_N,
            "device too large for a direct-only free map bootstrap"
        );

        // Sectors 0 (free map header) and 1 (root dir header) are fixed;
        // the bitmap's own data occupies the sectors right after them.
        let bitmap_data_start = 2u32;
        let mut bits = vec![0u8; byte_len];
        FreeMap::mark_used_raw(&mut bits, FREE_MAP_SECTOR, 1);
        FreeMap::mark_used_raw(&mut bits, ROOT_DIR_SECTOR, 1);
        FreeMap::mark_used_raw(&mut bits, bitmap_data_start, bitmap_sectors);

        let mut free_map_header = DiskInode::new(byte_len as i32, false);
        for (i, sector) in (bitmap_data_start..bitmap_data_start + bitmap_sectors as u32).enumerate() {
            free_map_header.direct[i] = sector;
        }
        cache.write(FREE_MAP_SECTOR, bytemuck::bytes_of(&free_map_header), 0, SECTOR_SIZE, 0);

        for (i, sector) in (bitmap_data_start..bitmap_data_start + bitmap_sectors as u32).enumerate() {
            let start = i * SECTOR_SIZE;
            let end = (start + SECTOR_SIZE).min(bits.len());
            let mut sector_buf = [0u8; SECTOR_SIZE];
            sector_buf[..end - start].copy_from_slice(&bits[start..end]);
            cache.write(sector, &sector_buf, 0, SECTOR_SIZE, 0);
        }

        let free_map_inode = try_log!(table.open(FREE_MAP_SECTOR));
        let free_map = FreeMap::open(free_map_inode, bit_count);
        free_map_cell
            .set(free_map)
            .unwrap_or_else(|_| panic!("free map set twice during format"));

        try_log!(Directory::create(&table, &cache, free_map_cell.get().unwrap(), ROOT_DIR_SECTOR, ROOT_DIR_SECTOR));

        Ok(Self {
            cache,
            table,
            free_map: free_map_cell,
            lock: Mutex::new(()),
            cwd: Mutex::new(ROOT_DIR_SECTOR),
        })
    }

    /// `filesys_init`: mounts an existing, already-formatted device.
    pub fn mount(device: Arc<dyn BlockDevice>) -> FsResult<Self> {
        let cache = Arc::new(BufferCache::new(device.clone()));
        let free_map_cell = Arc::new(OnceLock::new());
        let table = InodeTable::new(cache.clone(), free_map_cell.clone());

        let free_map_inode = try_log!(table.open(FREE_MAP_SECTOR));
        let bit_count = device.sector_count() as usize;
        let free_map = FreeMap::open(free_map_inode, bit_count);
        free_map_cell
            .set(free_map)
            .unwrap_or_else(|_| panic!("free map set twice during mount"));

        Ok(Self {
            cache,
            table,
            free_map: free_map_cell,
            lock: Mutex::new(()),
            cwd: Mutex::new(ROOT_DIR_SECTOR),
        })
    }

    fn cwd(&self) -> u32 {
        *self.cwd.lock().unwrap()
    }

    /// `filesys_create`: allocates an inode, wires it into its parent
    /// directory, and unwinds both on failure (§4.6).
    pub fn create(&self, path: &str, initial_size: usize) -> FsResult<()> {
        let _guard = self.lock.lock().unwrap();
        let (parent_sector, name) = try_log!(path::resolve_parent(&self.table, path, self.cwd()));
        if name.is_empty() || name == "." {
            err!(FsError::NameExists);
        }

        let parent_inode = try_log!(self.table.open(parent_sector));
        let parent_dir = try_log!(Directory::open(parent_inode));
        if parent_dir.is_removed() {
            parent_dir.close().close();
            err!(FsError::RemovedParent);
        }

        let sector = match self.free_map().allocate(1) {
            Ok(s) => s,
            Err(e) => {
                parent_dir.close().close();
                err!(e);
            }
        };

        if let Err(e) = inode::create(&self.cache, self.free_map(), sector, initial_size, false) {
            self.free_map().release(sector, 1);
            parent_dir.close().close();
            err!(e);
        }

        if let Err(e) = parent_dir.add(&name, sector) {
            inode::release_all_sectors(&self.cache, self.free_map(), sector);
            parent_dir.close().close();
            err!(e);
        }

        parent_dir.close().close();
        Ok(())
    }

    /// `filesys_open`: resolves `path` and returns a fresh file handle.
    pub fn open(&self, path: &str) -> FsResult<File> {
        let _guard = self.lock.lock().unwrap();
        let sector = try_log!(path::resolve(&self.table, path, self.cwd()));
        let inode = try_log!(self.table.open(sector));
        if inode.is_dir() {
            inode.close();
            err!(FsError::NotADirectory);
        }
        Ok(File::new(inode))
    }

    /// `filesys_remove`: unlinks `path` from its parent directory; the
    /// inode's sectors are released once its last opener closes it.
    pub fn remove(&self, path: &str) -> FsResult<()> {
        let _guard = self.lock.lock().unwrap();
        let (parent_sector, name) = try_log!(path::resolve_parent(&self.table, path, self.cwd()));

        let parent_inode = try_log!(self.table.open(parent_sector));
        let parent_dir = try_log!(Directory::open(parent_inode));

        let target_sector = match parent_dir.lookup(&name) {
            Some(s) => s,
            None => {
                parent_dir.close().close();
                err!(FsError::NoSuchPath);
            }
        };

        let target_inode = try_log!(self.table.open(target_sector));
        let target_is_dir = target_inode.is_dir();
        if target_is_dir {
            let target_dir = match Directory::open(target_inode.reopen()) {
                Ok(d) => d,
                Err(e) => {
                    target_inode.close();
                    parent_dir.close().close();
                    err!(e);
                }
            };
            let empty = target_dir.is_empty();
            target_dir.close().close();
            if !empty {
                target_inode.close();
                parent_dir.close().close();
                err!(FsError::DirectoryNotEmpty);
            }
        }

        let removal_result = parent_dir.remove(&name);

        if removal_result.is_ok() {
            target_inode.mark_removed();
        }
        target_inode.close();
        parent_dir.close().close();
        removal_result.map(|_| ())
    }

    /// `filesys_mkdir`: like `create`, but the new inode is a directory
    /// pre-populated with `.` and `..`.
    pub fn create_dir(&self, path: &str) -> FsResult<()> {
        let _guard = self.lock.lock().unwrap();
        let (parent_sector, name) = try_log!(path::resolve_parent(&self.table, path, self.cwd()));
        if name.is_empty() || name == "." {
            err!(FsError::NameExists);
        }

        let parent_inode = try_log!(self.table.open(parent_sector));
        let parent_dir = try_log!(Directory::open(parent_inode));
        if parent_dir.is_removed() {
            parent_dir.close().close();
            err!(FsError::RemovedParent);
        }

        let sector = match self.free_map().allocate(1) {
            Ok(s) => s,
            Err(e) => {
                parent_dir.close().close();
                err!(e);
            }
        };

        if let Err(e) = Directory::create(&self.table, &self.cache, self.free_map(), sector, parent_sector) {
            self.free_map().release(sector, 1);
            parent_dir.close().close();
            err!(e);
        }

        if let Err(e) = parent_dir.add(&name, sector) {
            inode::release_all_sectors(&self.cache, self.free_map(), sector);
            parent_dir.close().close();
            err!(e);
        }

        parent_dir.close().close();
        Ok(())
    }

    pub fn read_dir(&self, path: &str) -> FsResult<Vec<(String, u32)>> {
        let sector = try_log!(path::resolve(&self.table, path, self.cwd()));
        let inode = try_log!(self.table.open(sector));
        let dir = try_log!(Directory::open(inode));
        let entries = dir.readdir();
        dir.close().close();
        Ok(entries)
    }

    /// `filesys_chdir`: resolves `path` to a directory and adopts it.
    pub fn chdir(&self, path: &str) -> FsResult<()> {
        let sector = try_log!(path::resolve(&self.table, path, self.cwd()));
        let inode = try_log!(self.table.open(sector));
        if !inode.is_dir() {
            inode.close();
            err!(FsError::NotADirectory);
        }
        inode.close();
        *self.cwd.lock().unwrap() = sector;
        Ok(())
    }

    /// `filesys_done`: flushes every dirty buffer cache slot to the device.
    pub fn done(&self) {
        self.cache.flush_all();
    }
}
