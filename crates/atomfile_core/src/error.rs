//! Error types for transactional file operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for transactional file operations.
pub type FileResult<T> = Result<T, FileError>;

/// Errors that can occur while operating on a transactional file or a
/// mapped region.
///
/// Low-level failures always carry the failing operation and path so a
/// caller can tell which file an error belongs to without extra context.
#[derive(Debug, Error)]
pub enum FileError {
    /// A relative path could not be resolved to an absolute one.
    #[error("cannot resolve {path:?} to an absolute path: {source}")]
    Path {
        /// The path that failed to resolve.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Every generated temporary name collided with an existing file.
    ///
    /// This is a hard error: the caller should not retry with the same
    /// suffix source.
    #[error("temporary name generation for {path:?} exhausted after {attempts} attempts")]
    CreateExhausted {
        /// The target path the temporary names were derived from.
        path: PathBuf,
        /// How many candidate names were tried.
        attempts: u32,
    },

    /// An operation was attempted on a handle whose descriptor is gone.
    #[error("file {path:?} is closed")]
    Closed {
        /// The path the handle referred to while it was open.
        path: PathBuf,
    },

    /// `finalize` was called on a file that is not temporary.
    #[error("file {path:?} is not temporary")]
    NotTemporary {
        /// The path of the already-permanent file.
        path: PathBuf,
    },

    /// A rename or move was attempted while the file is still temporary.
    ///
    /// The temporary suffix is load-bearing until `finalize`, so the file
    /// must be published (or discarded) first.
    #[error("cannot rename temporary file {path:?} before finalize")]
    TemporaryFile {
        /// The temporary path of the file.
        path: PathBuf,
    },

    /// A descriptor-level operation failed.
    #[error("{op} failed for {path:?}: {source}")]
    Io {
        /// The operation that failed (`"read"`, `"seek"`, `"sync"`, ...).
        op: &'static str,
        /// The file the operation targeted.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The OS rejected a memory-mapping request.
    #[error("mmap failed for {path:?}: {source}")]
    Mmap {
        /// The file that was being mapped.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The mapped base address does not satisfy the requested element
    /// alignment.
    ///
    /// Mappings are page-aligned, so this cannot occur for element types
    /// with alignment below the page size; the check exists so a typed
    /// view can never be produced from a misaligned base.
    #[error("mapping of {path:?} is not aligned for the requested element type")]
    Misaligned {
        /// The file backing the mapping.
        path: PathBuf,
    },

    /// Several independent failures collected from one teardown path.
    ///
    /// `close` and `remove_if_tmp` run multiple steps and report every
    /// failure they encounter rather than only the first.
    #[error("multiple errors: {}", format_multiple(.0))]
    Multiple(Vec<FileError>),
}

impl FileError {
    /// Wraps a descriptor-level failure with operation and path context.
    pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Collapses a list of errors: zero errors is `None`, a single error
    /// stays itself, several become [`FileError::Multiple`].
    pub(crate) fn combine(mut errors: Vec<FileError>) -> Option<FileError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(FileError::Multiple(errors)),
        }
    }
}

/// Formats the parts of a combined error as one `;`-separated line.
fn format_multiple(errors: &[FileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<FileError> for io::Error {
    fn from(err: FileError) -> Self {
        // Preserve the underlying kind so callers matching on
        // `io::ErrorKind` keep working through the stream traits.
        let kind = match &err {
            FileError::Io { source, .. } | FileError::Mmap { source, .. } => source.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_empty_is_none() {
        assert!(FileError::combine(Vec::new()).is_none());
    }

    #[test]
    fn combine_single_stays_itself() {
        let err = FileError::Closed {
            path: PathBuf::from("/a"),
        };
        match FileError::combine(vec![err]) {
            Some(FileError::Closed { path }) => assert_eq!(path, PathBuf::from("/a")),
            other => panic!("unexpected combine result: {other:?}"),
        }
    }

    #[test]
    fn combine_many_reports_all() {
        let errors = vec![
            FileError::Closed {
                path: PathBuf::from("/a"),
            },
            FileError::NotTemporary {
                path: PathBuf::from("/b"),
            },
        ];
        let combined = FileError::combine(errors).unwrap();
        let message = combined.to_string();
        assert!(message.contains("/a"));
        assert!(message.contains("/b"));
    }
}
