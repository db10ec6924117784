//! End-to-end scenarios against an in-memory device, exercising the
//! façade the way a client of the whole file system would.

use std::sync::Arc;

use fs_core::{FileSystem, RamDisk};

fn fresh(sectors: u32) -> FileSystem {
    FileSystem::format(Arc::new(RamDisk::new(sectors))).expect("format")
}

#[test]
fn create_write_read_round_trips() {
    let fs = fresh(256);
    fs.create("/hello.txt", 0).unwrap();
    let file = fs.open("/hello.txt").unwrap();
    let written = file.write(b"hello, octopos").unwrap();
    assert_eq!(written, 14);
    file.seek(0);
    let mut buf = [0u8; 14];
    let read = file.read(&mut buf);
    assert_eq!(read, 14);
    assert_eq!(&buf, b"hello, octopos");
    file.close();
}

#[test]
fn sparse_write_zero_fills_the_gap() {
    let fs = fresh(256);
    fs.create("/sparse", 0).unwrap();
    let file = fs.open("/sparse").unwrap();
    file.write_at_offset(2000, b"tail");
    let mut buf = [0xAAu8; 2000];
    let n = file.read_at_offset(0, &mut buf);
    assert_eq!(n, 2000);
    assert!(buf.iter().all(|&b| b == 0), "gap bytes before the write must read back as zero");
    file.close();
}

#[test]
fn mkdir_readdir_and_nonempty_removal() {
    let fs = fresh(256);
    fs.create_dir("/sub").unwrap();
    fs.create("/sub/a", 0).unwrap();
    fs.create("/sub/b", 0).unwrap();

    let mut names: Vec<String> = fs.read_dir("/sub").unwrap().into_iter().map(|(n, _)| n).collect();
    names.sort();
    assert_eq!(names, vec!["a", "b"]);

    assert_eq!(fs.remove("/sub"), Err(fs_core::FsError::DirectoryNotEmpty));

    fs.remove("/sub/a").unwrap();
    fs.remove("/sub/b").unwrap();
    fs.remove("/sub").unwrap();
    assert_eq!(fs.read_dir("/sub"), Err(fs_core::FsError::NoSuchPath));
}

#[test]
fn duplicate_names_are_rejected_until_the_original_is_removed() {
    let fs = fresh(256);
    fs.create("/dup", 0).unwrap();
    assert_eq!(fs.create("/dup", 0), Err(fs_core::FsError::NameExists));

    fs.remove("/dup").unwrap();
    fs.create("/dup", 0).unwrap();
    assert!(fs.open("/dup").is_ok());
}

#[test]
fn dot_and_dotdot_resolve_through_subdirectories() {
    let fs = fresh(256);
    fs.create_dir("/a").unwrap();
    fs.create_dir("/a/b").unwrap();
    fs.create("/a/b/../marker", 0).unwrap();
    assert!(fs.open("/a/marker").is_ok());
    assert!(fs.open("/a/b/./../../a/marker").is_ok());
}

#[test]
fn write_spanning_the_double_indirect_boundary() {
    // DIRECT_N(123) + INDIRECT_N(128) sectors land the next sector in the
    // double-indirect range; a write straddling that boundary must read
    // back correctly after going through both tiers of indirection.
    const SECTOR_SIZE: usize = 512;
    let boundary_sector = 123 + 128;
    let offset = boundary_sector * SECTOR_SIZE - 10;

    let fs = fresh((boundary_sector as u32) + 64);
    fs.create("/big", 0).unwrap();
    let file = fs.open("/big").unwrap();

    let payload = [0x5Au8; 64];
    let written = file.write_at_offset(offset, &payload);
    assert_eq!(written, payload.len());

    let mut back = [0u8; 64];
    let read = file.read_at_offset(offset, &mut back);
    assert_eq!(read, 64);
    assert_eq!(back, payload);
    file.close();
}

#[test]
fn deny_write_blocks_writers_until_allowed_again() {
    let fs = fresh(256);
    fs.create("/exe", 0).unwrap();
    let runner = fs.open("/exe").unwrap();
    runner.deny_write();

    let other = fs.open("/exe").unwrap();
    let n = other.write(b"patched").unwrap();
    assert_eq!(n, 0, "a writer must be refused while any opener denies writes");

    runner.allow_write();
    let n = other.write(b"patched").unwrap();
    assert_eq!(n, 7);

    other.close();
    runner.close();
}

#[test]
fn removed_file_stays_readable_until_last_close_then_frees_its_sectors() {
    let fs = fresh(256);
    fs.create("/doomed", 4096).unwrap();
    let file = fs.open("/doomed").unwrap();
    file.write(&[7u8; 4096]).unwrap();
    file.seek(0);

    fs.remove("/doomed").unwrap();
    assert!(matches!(fs.open("/doomed"), Err(fs_core::FsError::NoSuchPath)));

    let mut buf = [0u8; 4096];
    assert_eq!(file.read(&mut buf), 4096, "an open removed file must stay readable");
    assert_eq!(buf, [7u8; 4096]);

    file.close();

    // The freed sectors must be available for reuse.
    fs.create("/reborn", 4096).unwrap();
    let reborn = fs.open("/reborn").unwrap();
    assert_eq!(reborn.length(), 4096);
    reborn.close();
}

#[test]
fn concurrent_appends_to_distinct_files_do_not_corrupt_each_other() {
    let fs = Arc::new(fresh(512));
    for i in 0..4 {
        fs.create(&format!("/f{i}"), 0).unwrap();
    }

    std::thread::scope(|scope| {
        for i in 0..4 {
            let fs = fs.clone();
            scope.spawn(move || {
                let file = fs.open(&format!("/f{i}")).unwrap();
                for _ in 0..50 {
                    file.write(&[i as u8; 37]).unwrap();
                }
                file.close();
            });
        }
    });

    for i in 0..4 {
        let file = fs.open(&format!("/f{i}")).unwrap();
        assert_eq!(file.length(), 50 * 37);
        let mut buf = vec![0u8; 50 * 37];
        file.read(&mut buf);
        assert!(buf.iter().all(|&b| b == i as u8));
        file.close();
    }
}

#[test]
fn buffer_cache_eviction_does_not_lose_writes() {
    const SECTOR_SIZE: usize = 512;
    const NBUF: usize = 64;

    let fs = fresh((NBUF as u32) + 200);
    fs.create("/spread", 0).unwrap();
    let file = fs.open("/spread").unwrap();

    // Touch more distinct sectors than the cache has slots, forcing the
    // clock hand all the way around at least once.
    for i in 0..(NBUF + 20) {
        let byte = (i % 256) as u8;
        file.write_at_offset(i * SECTOR_SIZE, &[byte; 1]);
    }

    for i in 0..(NBUF + 20) {
        let mut b = [0u8; 1];
        file.read_at_offset(i * SECTOR_SIZE, &mut b);
        assert_eq!(b[0], (i % 256) as u8, "sector {i} lost its write across eviction");
    }
    file.close();
}

#[test]
fn crash_adjacent_durability_survives_a_flush_and_remount() {
    let device = Arc::new(RamDisk::new(256));
    {
        let fs = FileSystem::format(device.clone()).unwrap();
        fs.create("/durable", 0).unwrap();
        let file = fs.open("/durable").unwrap();
        file.write(b"persisted").unwrap();
        file.close();
        fs.done();
    }

    let remounted = FileSystem::mount(device).unwrap();
    let file = remounted.open("/durable").unwrap();
    let mut buf = [0u8; 9];
    file.read(&mut buf);
    assert_eq!(&buf, b"persisted");
    file.close();
}
