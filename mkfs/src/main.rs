//! Host-side tool that formats an image file with the octopos file system
//! and optionally copies a handful of host files into its root directory.
//!
//! Grounded on the teacher's own `mkfs/src/main.rs`, which built the disk
//! layout by hand with raw sector writes; this version instead drives
//! `fs_core::FileSystem` directly, since the format/inode/directory logic
//! it used to duplicate now lives in the library the kernel links against
//! too.

use std::env::args;
use std::path::Path;
use std::sync::Arc;

use fs_core::{FileDisk, FileSystem};

/// Default image size, in sectors, when the caller doesn't resize the
/// underlying file themselves before running this tool.
const DEFAULT_SECTOR_COUNT: u32 = 2000;

fn main() {
    let args = args().collect::<Vec<String>>();
    if args.len() < 2 {
        eprintln!("Usage: mkfs <fs.img> [host-file]...");
        std::process::exit(1);
    }

    let image_path = Path::new(&args[1]);
    let device = FileDisk::create(image_path, DEFAULT_SECTOR_COUNT).expect("failed to create image file");
    let fs = FileSystem::format(Arc::new(device)).expect("failed to format file system");

    for host_path in &args[2..] {
        copy_in(&fs, host_path);
    }

    fs.done();
    println!("done");
}

/// Copies a single host file into the file system root, under its own
/// base name.
fn copy_in(fs: &FileSystem, host_path: &str) {
    let contents = std::fs::read(host_path).unwrap_or_else(|e| panic!("failed to read {host_path}: {e}"));
    let name = Path::new(host_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_else(|| panic!("not a valid file name: {host_path}"));
    let dest = format!("/{name}");

    fs.create(&dest, contents.len()).unwrap_or_else(|e| panic!("failed to create {dest}: {e}"));
    let file = fs.open(&dest).unwrap_or_else(|e| panic!("failed to open {dest}: {e}"));
    let written = file.write(&contents).unwrap_or_else(|e| panic!("failed to write {dest}: {e}"));
    assert_eq!(written, contents.len(), "short write copying {host_path} into {dest}");
    file.close();

    println!("copied {host_path} -> {dest} ({} bytes)", contents.len());
}
