//! Whole-file convenience operations built on the publish-or-discard
//! pattern.

use crate::error::{FileError, FileResult};
use crate::file::AtomicFile;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Returns whether `path` exists.
///
/// "Not found" is an answer, not an error; any other stat failure is
/// reported.
pub fn exists(path: impl AsRef<Path>) -> FileResult<bool> {
    let path = path.as_ref();
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(FileError::io("stat", path, err)),
    }
}

/// Reads the entire contents of `path`.
pub fn read_file(path: impl AsRef<Path>) -> FileResult<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|err| FileError::io("read", path, err))
}

/// Atomically replaces `path` with `contents`.
///
/// The bytes are written under a temporary name and published only once
/// complete and durable; on failure the temporary file is discarded. A
/// crash mid-write never leaves a partial file at `path`.
pub fn write_file(path: impl AsRef<Path>, contents: &[u8]) -> FileResult<()> {
    let file = AtomicFile::create_temp(path)?;
    let written = file.write(contents).and_then(|_| file.close());
    match written {
        Ok(()) => Ok(()),
        Err(err) => match file.remove_if_tmp() {
            Ok(()) => Err(err),
            Err(cleanup) => Err(FileError::Multiple(vec![err, cleanup])),
        },
    }
}

/// Copies `src` to `dst` atomically.
///
/// The copy streams into a temporary file next to `dst` and is published
/// only once complete; a failed copy leaves `dst` untouched.
pub fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> FileResult<()> {
    let src = src.as_ref();
    let mut reader = File::open(src).map_err(|err| FileError::io("open", src, err))?;

    let file = AtomicFile::create_temp(dst)?;
    match stream_into(&mut reader, src, &file) {
        Ok(()) => Ok(()),
        Err(err) => match file.remove_if_tmp() {
            Ok(()) => Err(err),
            Err(cleanup) => Err(FileError::Multiple(vec![err, cleanup])),
        },
    }
}

fn stream_into(reader: &mut File, src: &Path, file: &AtomicFile) -> FileResult<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|err| FileError::io("read", src, err))?;
        if n == 0 {
            break;
        }
        file.write(&buf[..n])?;
    }
    file.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exists_distinguishes_absence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe");

        assert!(!exists(&path).unwrap());
        write_file(&path, b"x").unwrap();
        assert!(exists(&path).unwrap());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("payload");

        write_file(&path, b"payload bytes").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"payload bytes");
    }

    #[test]
    fn write_file_leaves_no_temp_litter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clean");

        write_file(&path, b"data").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("clean")]);
    }

    #[test]
    fn copy_file_replicates_contents() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");

        write_file(&src, b"copied").unwrap();
        copy_file(&src, &dst).unwrap();
        assert_eq!(read_file(&dst).unwrap(), b"copied");
    }

    #[test]
    fn copy_missing_source_fails_cleanly() {
        let dir = tempdir().unwrap();
        let err = copy_file(dir.path().join("absent"), dir.path().join("dst")).unwrap_err();
        assert!(matches!(err, FileError::Io { op: "open", .. }));
        assert!(!exists(dir.path().join("dst")).unwrap());
    }
}
