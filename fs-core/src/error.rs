//! File system error codes.
//!
//! Grounded on the teacher kernel's `error.rs`/`KernelError`: a flat,
//! `Copy` enum with a handwritten `Display` impl rather than a `thiserror`
//! derive, plus the same `err!`/`try_log!` tracing macros. None of the
//! example repos in this pack reach for an error-derive crate, so this one
//! doesn't either.

use std::fmt;

/// Error kinds from the design's error-handling policy (§7): every fallible
/// operation reports one of these by value, never by exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NoSuchPath,
    NameTooLong,
    NameExists,
    NotADirectory,
    DirectoryNotEmpty,
    NoSpace,
    OutOfMemory,
    OutOfRangeOffset,
    WriteDenied,
    RemovedParent,
}

impl FsError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsError::NoSuchPath => "no such path",
            FsError::NameTooLong => "name too long",
            FsError::NameExists => "name exists",
            FsError::NotADirectory => "not a directory",
            FsError::DirectoryNotEmpty => "directory not empty",
            FsError::NoSpace => "no space left on free map",
            FsError::OutOfMemory => "out of memory",
            FsError::OutOfRangeOffset => "offset out of range",
            FsError::WriteDenied => "write denied",
            FsError::RemovedParent => "parent was removed",
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for FsError {}

pub type FsResult<T> = Result<T, FsError>;

/// Returns `Err(e)` from the current function, tracing `file:line` first in
/// debug builds. Use instead of a bare `return Err(...)`.
#[macro_export]
macro_rules! err {
    ($e:expr) => {{
        #[cfg(debug_assertions)]
        eprintln!("fs-core: error at {}:{}: {}", file!(), line!(), $e);
        return Err($e);
    }};
}

/// Propagates an `Err` with location tracing, the fallible equivalent of `?`.
#[macro_export]
macro_rules! try_log {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => {
                #[cfg(debug_assertions)]
                eprintln!("fs-core: at {}:{}", file!(), line!());
                return Err(e);
            }
        }
    };
}
