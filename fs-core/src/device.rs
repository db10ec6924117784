//! Block device adapter.
//!
//! The design treats the physical device driver as an external collaborator
//! (§1) and consumes only a `read_sector`/`write_sector` contract (§6). This
//! module is the trait boundary plus two concrete devices: `RamDisk` for
//! tests and `FileDisk`, grounded on the teacher's `mkfs/src/main.rs`, which
//! talks to a real file through `std::os::unix::fs::FileExt::{read_at,
//! write_at}` instead of the kernel's virtio MMIO driver.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Mutex;

use crate::param::SECTOR_SIZE;

/// A fixed-size-sector block device. All I/O is exactly one sector.
///
/// Implementations must be safe to call concurrently from multiple threads;
/// the buffer cache is the only client and serializes access to a given
/// sector through its own per-slot lock, but distinct sectors may be read or
/// written concurrently.
pub trait BlockDevice: Send + Sync {
    /// Total number of addressable sectors.
    fn sector_count(&self) -> u32;

    /// Reads sector `n` into `dst`, which must be exactly `SECTOR_SIZE` bytes.
    fn read_sector(&self, n: u32, dst: &mut [u8]);

    /// Writes `src`, which must be exactly `SECTOR_SIZE` bytes, to sector `n`.
    fn write_sector(&self, n: u32, src: &[u8]);
}

/// An in-memory block device, for tests.
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
}

impl RamDisk {
    pub fn new(sector_count: u32) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; sector_count as usize]),
        }
    }
}

impl BlockDevice for RamDisk {
    fn sector_count(&self) -> u32 {
        self.sectors.lock().unwrap().len() as u32
    }

    fn read_sector(&self, n: u32, dst: &mut [u8]) {
        assert_eq!(dst.len(), SECTOR_SIZE, "read_sector: bad dst length");
        let sectors = self.sectors.lock().unwrap();
        dst.copy_from_slice(&sectors[n as usize]);
    }

    fn write_sector(&self, n: u32, src: &[u8]) {
        assert_eq!(src.len(), SECTOR_SIZE, "write_sector: bad src length");
        let mut sectors = self.sectors.lock().unwrap();
        sectors[n as usize].copy_from_slice(src);
    }
}

/// A block device backed by a regular file, addressed with positional I/O so
/// concurrent readers/writers of distinct sectors never contend on a shared
/// cursor (the same pattern the teacher's host `mkfs` tool uses).
pub struct FileDisk {
    file: File,
    sector_count: u32,
}

impl FileDisk {
    pub fn open(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            sector_count: (len / SECTOR_SIZE as u64) as u32,
        })
    }

    /// Creates (or truncates) `path` and zero-fills it to hold `sector_count` sectors.
    pub fn create(path: &std::path::Path, sector_count: u32) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(sector_count as u64 * SECTOR_SIZE as u64)?;
        Ok(Self { file, sector_count })
    }
}

impl BlockDevice for FileDisk {
    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn read_sector(&self, n: u32, dst: &mut [u8]) {
        assert_eq!(dst.len(), SECTOR_SIZE, "read_sector: bad dst length");
        self.file
            .read_exact_at(dst, n as u64 * SECTOR_SIZE as u64)
            .expect("FileDisk::read_sector failed");
    }

    fn write_sector(&self, n: u32, src: &[u8]) {
        assert_eq!(src.len(), SECTOR_SIZE, "write_sector: bad src length");
        self.file
            .write_all_at(src, n as u64 * SECTOR_SIZE as u64)
            .expect("FileDisk::write_sector failed");
    }
}
