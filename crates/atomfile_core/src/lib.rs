//! # Atomfile
//!
//! Transactional file handles with atomic publish and zero-copy mmap
//! projection.
//!
//! An [`AtomicFile`] builds content under a hidden temporary name and
//! publishes it under its real name only once complete and durable.
//! Readers either see the previous file or the fully written new one,
//! never a partial state. One handle multiplexes buffered reads and
//! writes while keeping the observable cursor consistent, and can
//! project the file's raw bytes into typed in-memory views via
//! [`MmapRegion`].
//!
//! ## Design Principles
//!
//! - Handles are **opaque byte streams** with a small lifecycle contract
//!   (`finalize`, `close`, `remove_if_tmp`, `mmap`); content formats live
//!   in the consumers, not here.
//! - The atomic-publish guarantee covers a single file. There is no
//!   multi-file transaction or WAL protocol.
//! - Every failure carries the operation and path it belongs to;
//!   teardown paths report every failure they hit, not just the first.
//!
//! ## Example
//!
//! ```no_run
//! use atomfile_core::{AtomicFile, FileResult};
//!
//! fn publish(path: &str, payload: &[u8]) -> FileResult<()> {
//!     let file = AtomicFile::create_temp(path)?;
//!     match file.write(payload).and_then(|_| file.close()) {
//!         Ok(()) => Ok(()),
//!         Err(err) => {
//!             // Discard the partial file; `path` is untouched.
//!             file.remove_if_tmp()?;
//!             Err(err)
//!         }
//!     }
//! }
//! ```

mod buffer;
mod error;
mod file;
mod mmap;
mod ops;
mod options;
mod paths;
mod suffix;

pub use error::{FileError, FileResult};
pub use file::AtomicFile;
pub use mmap::{MmapRegion, ViewElement};
pub use ops::{copy_file, exists, read_file, write_file};
pub use options::FileOptions;
pub use suffix::{RandomSuffixes, SequentialSuffixes, SuffixSource};

#[cfg(debug_assertions)]
pub use file::open_handles;
