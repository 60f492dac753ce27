//! Transactional file handle: build under a temporary name, publish
//! atomically, or discard.

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{FileError, FileResult};
use crate::mmap::MmapRegion;
use crate::options::FileOptions;
use crate::paths;
use crate::suffix::{RandomSuffixes, SuffixSource};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek as _, SeekFrom};
use std::path::{Path, PathBuf};

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Open-handle counter backing [`open_handles`]. Debug builds only.
#[cfg(debug_assertions)]
static OPEN_HANDLES: AtomicUsize = AtomicUsize::new(0);

/// Number of file handles currently open in this process.
///
/// Debug builds only. This is a debugging aid for catching handles that
/// are dropped without being closed; correctness never depends on it.
#[cfg(debug_assertions)]
#[must_use]
pub fn open_handles() -> usize {
    OPEN_HANDLES.load(Ordering::SeqCst)
}

/// A cleanup action run during `close`, most recently registered first.
type ReleaseCallback = Box<dyn FnOnce() -> FileResult<()> + Send>;

struct Inner {
    /// Absolute path; carries a `.tmp<n>` suffix while `temporary`.
    path: PathBuf,
    /// True from creation until `finalize` succeeds.
    temporary: bool,
    /// The descriptor; `None` iff the handle is closed.
    file: Option<File>,
    read_buf: ReadBuffer,
    write_buf: WriteBuffer,
    /// LIFO stack of release actions, run during `close` before the
    /// descriptor itself is released.
    on_close: Vec<ReleaseCallback>,
}

/// A transactional file handle.
///
/// The handle wraps one descriptor and multiplexes buffered reads and
/// writes through it while keeping the observable cursor consistent:
/// interleaved `read`/`write`/`seek` calls behave as if unbuffered.
///
/// # Lifecycle
///
/// A file created with [`create_temp`](Self::create_temp) lives under a
/// hidden `<path>.tmp<n>` name until [`finalize`](Self::finalize) syncs
/// its content and atomically renames it to `<path>`. Only a fully
/// written, durable file is ever observable under the caller's intended
/// name. [`close`](Self::close) finalizes automatically; a failed write
/// is discarded with [`remove_if_tmp`](Self::remove_if_tmp).
///
/// # Thread Safety
///
/// A single lock serializes every operation, including metadata queries,
/// so the handle can be shared across threads. It is a single-writer
/// handle, not a concurrent I/O primitive.
///
/// # Example
///
/// ```no_run
/// use atomfile_core::AtomicFile;
///
/// # fn main() -> atomfile_core::FileResult<()> {
/// let file = AtomicFile::create_temp("data.bin")?;
/// file.write(b"payload")?;
/// file.close()?; // publishes data.bin
/// # Ok(())
/// # }
/// ```
pub struct AtomicFile {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for AtomicFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicFile").finish_non_exhaustive()
    }
}

impl AtomicFile {
    /// Creates a file under a hidden temporary name derived from `path`.
    ///
    /// The file must later be published with [`finalize`](Self::finalize)
    /// (or [`close`](Self::close)) or discarded with
    /// [`remove_if_tmp`](Self::remove_if_tmp).
    ///
    /// # Errors
    ///
    /// Returns `CreateExhausted` if every generated temporary name
    /// collided with an existing file.
    pub fn create_temp(path: impl AsRef<Path>) -> FileResult<Self> {
        Self::create_temp_with(path, &mut RandomSuffixes, &FileOptions::default())
    }

    /// Creates a temporary file with an explicit suffix source and
    /// options.
    pub fn create_temp_with(
        path: impl AsRef<Path>,
        suffixes: &mut dyn SuffixSource,
        options: &FileOptions,
    ) -> FileResult<Self> {
        let target = paths::absolute(path.as_ref())?;
        for _ in 0..options.max_create_attempts {
            let candidate = paths::temp_name(&target, suffixes.next_suffix());
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => return Ok(Self::from_parts(candidate, file, true, options)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(FileError::io("create", &candidate, err)),
            }
        }
        Err(FileError::CreateExhausted {
            path: target,
            attempts: options.max_create_attempts,
        })
    }

    /// Creates and immediately publishes a file at `path`.
    ///
    /// If publishing fails the partial temporary file is removed before
    /// the error is returned, so a failed create never leaves litter.
    pub fn create(path: impl AsRef<Path>) -> FileResult<Self> {
        let file = Self::create_temp(path)?;
        if let Err(err) = file.finalize() {
            return match file.remove_if_tmp() {
                Ok(()) => Err(err),
                Err(cleanup) => Err(FileError::Multiple(vec![err, cleanup])),
            };
        }
        Ok(file)
    }

    /// Opens an existing permanent file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> FileResult<Self> {
        Self::open_with(path, &FileOptions::default())
    }

    /// Opens an existing permanent file with explicit options.
    pub fn open_with(path: impl AsRef<Path>, options: &FileOptions) -> FileResult<Self> {
        let target = paths::absolute(path.as_ref())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&target)
            .map_err(|err| FileError::io("open", &target, err))?;
        Ok(Self::from_parts(target, file, false, options))
    }

    fn from_parts(path: PathBuf, file: File, temporary: bool, options: &FileOptions) -> Self {
        #[cfg(debug_assertions)]
        OPEN_HANDLES.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Mutex::new(Inner {
                path,
                temporary,
                file: Some(file),
                read_buf: ReadBuffer::new(options.buffer_capacity),
                write_buf: WriteBuffer::new(options.buffer_capacity),
                on_close: Vec::new(),
            }),
        }
    }

    /// Returns the file's current absolute path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Returns whether the file still lives under its temporary name.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.inner.lock().temporary
    }

    /// Reads into `out` at the logical cursor.
    ///
    /// Pending buffered writes are pushed to the descriptor first so the
    /// read observes them.
    pub fn read(&self, out: &mut [u8]) -> FileResult<usize> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.flush_writes()?;
        let Inner {
            path,
            file,
            read_buf,
            ..
        } = &mut *inner;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        read_buf
            .read(file, out)
            .map_err(|err| FileError::io("read", path, err))
    }

    /// Writes `data` at the logical cursor.
    ///
    /// Any read-ahead is unwound first so the write lands where the
    /// caller last observed the cursor.
    pub fn write(&self, data: &[u8]) -> FileResult<usize> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.unread()?;
        let Inner {
            path,
            file,
            write_buf,
            ..
        } = &mut *inner;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        write_buf
            .write(file, data)
            .map_err(|err| FileError::io("write", path, err))
    }

    /// Moves the logical cursor and returns its new absolute offset.
    pub fn seek(&self, pos: SeekFrom) -> FileResult<u64> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.empty_buffers()?;
        let Inner { path, file, .. } = &mut *inner;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        file.seek(pos)
            .map_err(|err| FileError::io("seek", path, err))
    }

    /// Returns the file's current size in bytes.
    pub fn size(&self) -> FileResult<u64> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.empty_buffers()?;
        let Inner { path, file, .. } = &mut *inner;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        let metadata = file
            .metadata()
            .map_err(|err| FileError::io("stat", path, err))?;
        Ok(metadata.len())
    }

    /// Truncates or extends the file to `size` bytes.
    ///
    /// The logical cursor is left where it was; writing past the end
    /// zero-fills the gap.
    pub fn set_size(&self, size: u64) -> FileResult<()> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.empty_buffers()?;
        let Inner { path, file, .. } = &mut *inner;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        file.set_len(size)
            .map_err(|err| FileError::io("truncate", path, err))
    }

    /// Pushes all buffered data to the descriptor and syncs it to disk.
    pub fn sync(&self) -> FileResult<()> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.sync()
    }

    /// Publishes a temporary file under its real name.
    ///
    /// Syncs all buffered and OS-level data, then atomically renames the
    /// file to strip the temporary suffix and fsyncs the parent
    /// directory. A reader that can observe the final name can therefore
    /// also observe fully durable content.
    ///
    /// # Errors
    ///
    /// Returns `NotTemporary` if the file was already published.
    pub fn finalize(&self) -> FileResult<()> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        if !inner.temporary {
            return Err(FileError::NotTemporary {
                path: inner.path.clone(),
            });
        }
        inner.finalize()
    }

    /// Closes the handle, publishing the file first if it is still
    /// temporary.
    ///
    /// Release callbacks registered by [`mmap`](Self::mmap) run in
    /// reverse registration order before the descriptor is released, so
    /// an attached mapping is torn down while the descriptor is still
    /// valid. Every failure along the way is reported in one combined
    /// error rather than only the first.
    pub fn close(&self) -> FileResult<()> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.close()
    }

    /// Discards a temporary file: deletes it from disk and closes the
    /// descriptor.
    ///
    /// A no-op if the handle is already closed or the file was
    /// published. Safe to call repeatedly. A deletion failure is
    /// reported, but the descriptor is closed regardless.
    pub fn remove_if_tmp(&self) -> FileResult<()> {
        let mut inner = self.inner.lock();
        if inner.file.is_none() || !inner.temporary {
            return Ok(());
        }
        let mut errors = Vec::new();
        if let Err(err) = fs::remove_file(&inner.path) {
            errors.push(FileError::io("remove", &inner.path, err));
        }
        inner.on_close.clear();
        inner.release_descriptor();
        match FileError::combine(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Deletes the file from disk and closes the descriptor, whether or
    /// not it is temporary.
    pub fn remove(&self) -> FileResult<()> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        let path = inner.path.clone();
        inner.on_close.clear();
        inner.release_descriptor();
        fs::remove_file(&path).map_err(|err| FileError::io("remove", &path, err))
    }

    /// Renames the file within its directory.
    ///
    /// # Errors
    ///
    /// Returns `TemporaryFile` while the file is unpublished; the
    /// temporary suffix is load-bearing until `finalize`.
    pub fn rename(&self, file_name: impl AsRef<std::ffi::OsStr>) -> FileResult<()> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        let target = paths::sibling(&inner.path, file_name.as_ref());
        inner.relocate(target)
    }

    /// Moves the file to a new path, which may be in another directory.
    ///
    /// # Errors
    ///
    /// Returns `TemporaryFile` while the file is unpublished.
    pub fn move_to(&self, new_path: impl AsRef<Path>) -> FileResult<()> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        let target = paths::absolute(new_path.as_ref())?;
        inner.relocate(target)
    }

    /// Maps the file's current contents into memory.
    ///
    /// Buffers are reconciled and the file synced first, so the mapping
    /// observes everything written through the handle. The region's
    /// teardown is registered as a release callback: closing the file
    /// also closes the region, in the correct order. The returned handle
    /// stays independently closable.
    pub fn mmap(&self) -> FileResult<MmapRegion> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        let region = inner.map_current()?;
        let handle = region.clone();
        inner.on_close.push(Box::new(move || handle.close()));
        Ok(region)
    }

    /// Maps the current contents without tying the region's lifetime to
    /// this handle. Used by `MmapRegion::create`, which closes the file
    /// right after mapping.
    pub(crate) fn map_unregistered(&self) -> FileResult<MmapRegion> {
        let mut inner = self.inner.lock();
        inner.require_open()?;
        inner.map_current()
    }

    #[cfg(test)]
    fn push_release(&self, release: ReleaseCallback) {
        self.inner.lock().on_close.push(release);
    }
}

impl Inner {
    fn require_open(&self) -> FileResult<()> {
        if self.file.is_none() {
            return Err(FileError::Closed {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Seeks the descriptor back over read-ahead bytes and discards
    /// them, so its position matches the logical cursor again.
    fn unread(&mut self) -> FileResult<()> {
        let buffered = self.read_buf.buffered();
        if buffered == 0 {
            return Ok(());
        }
        let Inner {
            path,
            file,
            read_buf,
            ..
        } = self;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        file.seek(SeekFrom::Current(-(buffered as i64)))
            .map_err(|err| FileError::io("seek", path, err))?;
        read_buf.clear();
        Ok(())
    }

    fn flush_writes(&mut self) -> FileResult<()> {
        if self.write_buf.buffered() == 0 {
            return Ok(());
        }
        let Inner {
            path,
            file,
            write_buf,
            ..
        } = self;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        write_buf
            .flush(file)
            .map_err(|err| FileError::io("write", path, err))
    }

    fn empty_buffers(&mut self) -> FileResult<()> {
        self.unread()?;
        self.flush_writes()
    }

    fn sync(&mut self) -> FileResult<()> {
        self.empty_buffers()?;
        let Inner { path, file, .. } = self;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        file.sync_all()
            .map_err(|err| FileError::io("sync", path, err))
    }

    /// Sync data, strip the temporary suffix with an atomic rename, and
    /// make the rename durable. Callers have verified the file is open
    /// and temporary.
    fn finalize(&mut self) -> FileResult<()> {
        self.sync()?;
        let published = paths::published_name(&self.path)?;
        fs::rename(&self.path, &published)
            .map_err(|err| FileError::io("rename", &self.path, err))?;
        sync_parent(&published)?;
        tracing::debug!(path = ?published, "published file");
        self.path = published;
        self.temporary = false;
        Ok(())
    }

    fn close(&mut self) -> FileResult<()> {
        let mut errors = Vec::new();
        if self.temporary {
            if let Err(err) = self.finalize() {
                errors.push(err);
            }
        }
        if let Err(err) = self.sync() {
            errors.push(err);
        }
        while let Some(release) = self.on_close.pop() {
            if let Err(err) = release() {
                errors.push(err);
            }
        }
        // The sync above is the last point where descriptor failures can
        // surface; dropping the descriptor reports nothing further.
        self.release_descriptor();
        match FileError::combine(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    fn release_descriptor(&mut self) {
        if self.file.take().is_some() {
            #[cfg(debug_assertions)]
            OPEN_HANDLES.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn relocate(&mut self, target: PathBuf) -> FileResult<()> {
        if self.temporary {
            return Err(FileError::TemporaryFile {
                path: self.path.clone(),
            });
        }
        fs::rename(&self.path, &target)
            .map_err(|err| FileError::io("rename", &self.path, err))?;
        self.path = target;
        Ok(())
    }

    fn map_current(&mut self) -> FileResult<MmapRegion> {
        // Coherency plus durability: the mapping must observe everything
        // written through the handle.
        self.sync()?;
        let Inner { path, file, .. } = self;
        let file = file.as_mut().ok_or_else(|| FileError::Closed { path: path.clone() })?;
        MmapRegion::from_file(file, path)
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.file.is_some() {
            tracing::warn!(path = ?inner.path, "file handle dropped while still open, closing");
            if let Err(error) = inner.close() {
                tracing::warn!(path = ?inner.path, %error, "closing dropped file handle failed");
            }
        }
    }
}

/// Fsync the directory containing `path` so a rename within it is
/// durable. NTFS journals metadata on its own, so this is Unix-only.
#[cfg(unix)]
fn sync_parent(path: &Path) -> FileResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let dir = File::open(parent).map_err(|err| FileError::io("open directory", parent, err))?;
    dir.sync_all()
        .map_err(|err| FileError::io("sync directory", parent, err))
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> FileResult<()> {
    Ok(())
}

impl io::Read for &AtomicFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AtomicFile::read(*self, buf).map_err(io::Error::from)
    }
}

impl io::Write for &AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AtomicFile::write(*self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.require_open().map_err(io::Error::from)?;
        inner.flush_writes().map_err(io::Error::from)
    }
}

impl io::Seek for &AtomicFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        AtomicFile::seek(*self, pos).map_err(io::Error::from)
    }
}

impl io::Read for AtomicFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AtomicFile::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AtomicFile::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut &*self)
    }
}

impl io::Seek for AtomicFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        AtomicFile::seek(self, pos).map_err(io::Error::from)
    }
}
