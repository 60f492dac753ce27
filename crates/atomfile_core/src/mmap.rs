//! Zero-copy typed projection of a file's bytes.
//!
//! A [`MmapRegion`] maps a file into memory and hands out typed views
//! that alias the mapped bytes directly, without copying. Views are
//! closure-scoped, so a view can never outlive the mapping it borrows
//! from; once the region is closed, every attempt to take a view fails
//! with `Closed` instead of touching freed memory.
//!
//! The mapping is shared memory with the OS page cache: writes through a
//! view are visible to any other mapper of the same file. The region
//! itself provides no locking over the mapped bytes; callers that share
//! mapped content across threads must synchronize externally.

#![allow(unsafe_code)]

use crate::error::{FileError, FileResult};
use crate::file::AtomicFile;
use crate::paths;
use memmap2::MmapMut;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Element types that may view mapped bytes directly.
///
/// # Safety
///
/// Implementors must be plain data: every bit pattern is a valid value
/// and the type contains no padding, pointers, or interior mutability.
pub unsafe trait ViewElement: Copy + Send + Sync + 'static {}

macro_rules! view_element {
    ($($ty:ty),* $(,)?) => {
        $(
            // Safety: fixed-width primitives admit every bit pattern.
            unsafe impl ViewElement for $ty {}
        )*
    };
}

view_element!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

enum MapState {
    /// A live OS mapping.
    Mapped(MmapMut),
    /// A zero-length file; no OS mapping exists, views are empty.
    Empty,
    /// Unmapped. Repeated closes land here and are no-ops.
    Closed,
}

struct Shared {
    path: PathBuf,
    /// Byte length at mapping time, fixed for the region's lifetime.
    len: usize,
    state: Mutex<MapState>,
}

/// A memory-mapped region with zero-copy typed views.
///
/// Regions are created standalone with [`create`](Self::create) and
/// [`open`](Self::open), or attached to a live handle with
/// [`AtomicFile::mmap`]. Clones share the same mapping; closing any
/// clone closes them all, and close is idempotent.
///
/// # Example
///
/// ```no_run
/// use atomfile_core::MmapRegion;
///
/// # fn main() -> atomfile_core::FileResult<()> {
/// let region = MmapRegion::create("table.bin", 16)?;
/// region.with_view_mut::<u32, _>(|cells| cells[0] = 42)?;
/// region.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MmapRegion {
    shared: Arc<Shared>,
}

impl MmapRegion {
    /// Creates a file of `size` bytes at `path` and maps it.
    ///
    /// The file is built under a temporary name and published once the
    /// mapping is live; if anything fails, the partial temporary file is
    /// removed before the error is returned. The backing descriptor is
    /// closed immediately; the mapping remains valid without it.
    pub fn create(path: impl AsRef<Path>, size: u64) -> FileResult<Self> {
        let file = AtomicFile::create_temp(path)?;
        match Self::create_mapped(&file, size) {
            Ok(region) => Ok(region),
            Err(err) => match file.remove_if_tmp() {
                Ok(()) => Err(err),
                Err(cleanup) => Err(FileError::Multiple(vec![err, cleanup])),
            },
        }
    }

    fn create_mapped(file: &AtomicFile, size: u64) -> FileResult<Self> {
        file.set_size(size)?;
        let region = file.map_unregistered()?;
        file.close()?;
        Ok(region)
    }

    /// Maps an existing file's full current length.
    ///
    /// The descriptor is closed right after mapping; the OS keeps the
    /// mapping valid.
    pub fn open(path: impl AsRef<Path>) -> FileResult<Self> {
        let target = paths::absolute(path.as_ref())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&target)
            .map_err(|err| FileError::io("open", &target, err))?;
        Self::from_file(&file, &target)
    }

    /// Maps `file`'s current length. Zero-length files get no OS
    /// mapping; their views are empty.
    pub(crate) fn from_file(file: &File, path: &Path) -> FileResult<Self> {
        let len = file
            .metadata()
            .map_err(|err| FileError::io("stat", path, err))?
            .len() as usize;
        let state = if len == 0 {
            MapState::Empty
        } else {
            // Safety: the mapping outlives the descriptor by OS
            // guarantee. Callers must not truncate the file while it is
            // mapped; that contract is documented on the public entry
            // points.
            let map = unsafe { MmapMut::map_mut(file) }.map_err(|source| FileError::Mmap {
                path: path.to_path_buf(),
                source,
            })?;
            MapState::Mapped(map)
        };
        Ok(Self {
            shared: Arc::new(Shared {
                path: path.to_path_buf(),
                len,
                state: Mutex::new(state),
            }),
        })
    }

    /// Byte length of the mapping at creation time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.len
    }

    /// Returns whether the mapping covers zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.len == 0
    }

    /// Returns whether the region has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.shared.state.lock(), MapState::Closed)
    }

    /// Path of the file backing the mapping.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.shared.path.clone()
    }

    /// Runs `f` over a shared typed view of the mapped bytes.
    ///
    /// The view's length is `len() / size_of::<T>()`, truncating:
    /// trailing bytes that do not fill a whole element are unreachable,
    /// which is not an error. A zero-length region always yields an
    /// empty slice.
    ///
    /// The slice borrow ends when `f` returns, so a view cannot outlive
    /// the mapping. Do not call back into the same region from inside
    /// `f`; the region's lock is held for the duration of the call.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the region has been closed.
    pub fn with_view<T: ViewElement, R>(&self, f: impl FnOnce(&[T]) -> R) -> FileResult<R> {
        let state = self.shared.state.lock();
        match &*state {
            MapState::Closed => Err(FileError::Closed {
                path: self.shared.path.clone(),
            }),
            MapState::Empty => Ok(f(&[])),
            MapState::Mapped(map) => Ok(f(project::<T>(map.as_ref(), &self.shared.path)?)),
        }
    }

    /// Runs `f` over a mutable typed view of the mapped bytes.
    ///
    /// Writes land in shared memory and become visible to every other
    /// mapper of the file per OS semantics. See
    /// [`with_view`](Self::with_view) for the length and borrowing
    /// rules.
    pub fn with_view_mut<T: ViewElement, R>(
        &self,
        f: impl FnOnce(&mut [T]) -> R,
    ) -> FileResult<R> {
        let mut state = self.shared.state.lock();
        match &mut *state {
            MapState::Closed => Err(FileError::Closed {
                path: self.shared.path.clone(),
            }),
            MapState::Empty => Ok(f(&mut [])),
            MapState::Mapped(map) => Ok(f(project_mut::<T>(map.as_mut(), &self.shared.path)?)),
        }
    }

    /// Flushes dirty pages and releases the mapped region.
    ///
    /// Safe to call repeatedly and from any clone; every call after the
    /// first is a no-op. A file handle that produced this region via
    /// [`AtomicFile::mmap`] calls this automatically during its close.
    pub fn close(&self) -> FileResult<()> {
        let mut state = self.shared.state.lock();
        match mem::replace(&mut *state, MapState::Closed) {
            MapState::Mapped(map) => map.flush().map_err(|source| FileError::Mmap {
                path: self.shared.path.clone(),
                source,
            }),
            MapState::Empty | MapState::Closed => Ok(()),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if matches!(*self.state.get_mut(), MapState::Mapped(_)) {
            tracing::warn!(path = ?self.path, "mapped region dropped while still mapped");
            // The MmapMut drop below releases the mapping itself.
        }
    }
}

impl std::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapRegion")
            .field("path", &self.shared.path)
            .field("len", &self.shared.len)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Reinterprets `bytes` as a slice of `T`, truncating a ragged tail.
fn project<'a, T: ViewElement>(bytes: &'a [u8], path: &Path) -> FileResult<&'a [T]> {
    let len = bytes.len() / mem::size_of::<T>();
    if len == 0 {
        return Ok(&[]);
    }
    let ptr = bytes.as_ptr();
    if ptr.align_offset(mem::align_of::<T>()) != 0 {
        return Err(FileError::Misaligned {
            path: path.to_path_buf(),
        });
    }
    // Safety: `ptr` is valid for `len * size_of::<T>()` bytes of the
    // live mapping, alignment was checked above, and `ViewElement`
    // admits every bit pattern. The borrow keeps the mapping alive.
    Ok(unsafe { std::slice::from_raw_parts(ptr.cast::<T>(), len) })
}

/// Mutable variant of [`project`].
fn project_mut<'a, T: ViewElement>(bytes: &'a mut [u8], path: &Path) -> FileResult<&'a mut [T]> {
    let len = bytes.len() / mem::size_of::<T>();
    if len == 0 {
        return Ok(&mut []);
    }
    let ptr = bytes.as_mut_ptr();
    if ptr.align_offset(mem::align_of::<T>()) != 0 {
        return Err(FileError::Misaligned {
            path: path.to_path_buf(),
        });
    }
    // Safety: as in `project`, plus exclusivity: the caller holds the
    // region's lock, so no other view aliases the bytes concurrently.
    Ok(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<T>(), len) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn view_length_truncates() {
        let dir = tempdir().unwrap();
        let region = MmapRegion::create(dir.path().join("ragged"), 10).unwrap();

        // 10 bytes hold two whole u32 cells; the tail is unreachable.
        let cells = region.with_view::<u32, _>(|v| v.len()).unwrap();
        assert_eq!(cells, 2);
        let bytes = region.with_view::<u8, _>(|v| v.len()).unwrap();
        assert_eq!(bytes, 10);

        region.close().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let region = MmapRegion::create(dir.path().join("twice"), 8).unwrap();

        region.close().unwrap();
        region.close().unwrap();
        assert!(region.is_closed());
        assert!(region.with_view::<u8, _>(|_| ()).is_err());
    }

    #[test]
    fn clones_share_memory_and_close_state() {
        let dir = tempdir().unwrap();
        let region = MmapRegion::create(dir.path().join("shared"), 4).unwrap();
        let clone = region.clone();

        region.with_view_mut::<u8, _>(|v| v[0] = 7).unwrap();
        let seen = clone.with_view::<u8, _>(|v| v[0]).unwrap();
        assert_eq!(seen, 7);

        clone.close().unwrap();
        assert!(region.is_closed());
    }
}
