//! Path resolution and temporary-name helpers.

use crate::error::{FileError, FileResult};
use std::path::{Path, PathBuf};

/// Resolves `path` against the current working directory.
///
/// Unlike `fs::canonicalize` this does not require the file to exist and
/// does not follow symlinks, which matters because temporary files are
/// resolved before they are created.
pub(crate) fn absolute(path: &Path) -> FileResult<PathBuf> {
    std::path::absolute(path).map_err(|source| FileError::Path {
        path: path.to_path_buf(),
        source,
    })
}

/// Appends `.tmp<suffix>` to the file name of `path`.
pub(crate) fn temp_name(path: &Path, suffix: u16) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".tmp{suffix}"));
    PathBuf::from(name)
}

/// Strips the trailing `.tmp<digits>` component added by [`temp_name`].
///
/// Fails with `NotTemporary` if the file name does not end in a
/// temporary suffix.
pub(crate) fn published_name(path: &Path) -> FileResult<PathBuf> {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if let Some(idx) = name.rfind(".tmp") {
            let digits = &name[idx + ".tmp".len()..];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(path.with_file_name(&name[..idx]));
            }
        }
    }
    Err(FileError::NotTemporary {
        path: path.to_path_buf(),
    })
}

/// Returns the path with the same parent but a different file name.
pub(crate) fn sibling(path: &Path, file_name: &std::ffi::OsStr) -> PathBuf {
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_name_appends_suffix() {
        let path = temp_name(Path::new("/data/index.bin"), 513);
        assert_eq!(path, PathBuf::from("/data/index.bin.tmp513"));
    }

    #[test]
    fn published_name_strips_suffix() {
        let published = published_name(Path::new("/data/index.bin.tmp513")).unwrap();
        assert_eq!(published, PathBuf::from("/data/index.bin"));
    }

    #[test]
    fn published_name_keeps_inner_extension() {
        let published = published_name(Path::new("/data/index.tmp.tmp0")).unwrap();
        assert_eq!(published, PathBuf::from("/data/index.tmp"));
    }

    #[test]
    fn published_name_rejects_plain_files() {
        assert!(published_name(Path::new("/data/index.bin")).is_err());
        assert!(published_name(Path::new("/data/index.tmpx")).is_err());
        assert!(published_name(Path::new("/data/index.tmp")).is_err());
    }

    #[test]
    fn sibling_replaces_file_name() {
        let path = sibling(Path::new("/data/index.bin"), std::ffi::OsStr::new("index.old"));
        assert_eq!(path, PathBuf::from("/data/index.old"));
    }

    #[test]
    fn absolute_resolves_relative_paths() {
        let path = absolute(Path::new("some/file")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("some/file"));
    }
}
