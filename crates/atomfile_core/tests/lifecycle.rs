//! Lifecycle tests: publish, abandon, collision handling, renames.

use atomfile_core::{
    exists, AtomicFile, FileError, FileOptions, SequentialSuffixes,
};
use tempfile::tempdir;

fn dir_entries(path: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn close_publishes_without_explicit_finalize() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("report.bin");

    let file = AtomicFile::create_temp(&target).unwrap();
    file.write(b"contents").unwrap();
    file.close().unwrap();

    // Exactly one file, under the real name, no temp suffix left.
    assert_eq!(dir_entries(dir.path()), vec!["report.bin".to_string()]);
    assert_eq!(std::fs::read(&target).unwrap(), b"contents");
}

#[test]
fn explicit_finalize_strips_suffix_and_flips_state() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("data");

    let file = AtomicFile::create_temp(&target).unwrap();
    assert!(file.is_temporary());
    assert_ne!(file.path(), target);

    file.finalize().unwrap();
    assert!(!file.is_temporary());
    assert_eq!(file.path(), target);

    file.close().unwrap();
    assert!(exists(&target).unwrap());
}

#[test]
fn abandon_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("abandoned");

    let file = AtomicFile::create_temp(&target).unwrap();
    file.write(b"partial").unwrap();
    file.remove_if_tmp().unwrap();

    assert!(dir_entries(dir.path()).is_empty());

    // Repeated discards are no-ops; close reports the closed handle.
    file.remove_if_tmp().unwrap();
    assert!(matches!(file.close(), Err(FileError::Closed { .. })));
}

#[test]
fn remove_if_tmp_after_publish_is_a_noop() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("kept");

    let file = AtomicFile::create_temp(&target).unwrap();
    file.finalize().unwrap();
    file.remove_if_tmp().unwrap();

    // The published file is untouched and the handle still open.
    assert!(exists(&target).unwrap());
    file.close().unwrap();
}

#[test]
fn collision_exhaustion_creates_nothing() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("busy");

    // Occupy every name a sequential source starting at 0 will try.
    let options = FileOptions::default();
    for suffix in 0..options.max_create_attempts {
        std::fs::write(dir.path().join(format!("busy.tmp{suffix}")), b"").unwrap();
    }

    let mut suffixes = SequentialSuffixes::new(0);
    let err = AtomicFile::create_temp_with(&target, &mut suffixes, &options).unwrap_err();
    assert!(matches!(err, FileError::CreateExhausted { attempts: 100, .. }));

    // Only the pre-created colliders remain.
    assert_eq!(dir_entries(dir.path()).len(), 100);
}

#[test]
fn sequential_source_skips_colliders() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("busy");

    std::fs::write(dir.path().join("busy.tmp5"), b"").unwrap();
    std::fs::write(dir.path().join("busy.tmp6"), b"").unwrap();

    let mut suffixes = SequentialSuffixes::new(5);
    let file =
        AtomicFile::create_temp_with(&target, &mut suffixes, &FileOptions::default()).unwrap();
    assert!(file.path().ends_with("busy.tmp7"));
    file.remove_if_tmp().unwrap();
}

#[test]
fn create_publishes_immediately() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("direct");

    let file = AtomicFile::create(&target).unwrap();
    assert!(!file.is_temporary());
    assert_eq!(file.path(), target);
    assert!(exists(&target).unwrap());
    file.close().unwrap();
}

#[test]
fn open_reads_existing_contents() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("existing");
    std::fs::write(&target, b"already here").unwrap();

    let file = AtomicFile::open(&target).unwrap();
    assert!(!file.is_temporary());

    let mut buf = vec![0u8; 12];
    let mut read = 0;
    while read < buf.len() {
        let n = file.read(&mut buf[read..]).unwrap();
        assert!(n > 0);
        read += n;
    }
    assert_eq!(buf, b"already here");
    file.close().unwrap();
}

#[test]
fn open_missing_file_fails_with_context() {
    let dir = tempdir().unwrap();
    let err = AtomicFile::open(dir.path().join("missing")).unwrap_err();
    match err {
        FileError::Io { op, path, .. } => {
            assert_eq!(op, "open");
            assert!(path.ends_with("missing"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn finalize_twice_reports_not_temporary() {
    let dir = tempdir().unwrap();
    let file = AtomicFile::create_temp(dir.path().join("once")).unwrap();

    file.finalize().unwrap();
    assert!(matches!(
        file.finalize(),
        Err(FileError::NotTemporary { .. })
    ));
    file.close().unwrap();
}

#[test]
fn moving_a_temporary_file_is_rejected() {
    let dir = tempdir().unwrap();
    let file = AtomicFile::create_temp(dir.path().join("pinned")).unwrap();

    assert!(matches!(
        file.move_to(dir.path().join("elsewhere")),
        Err(FileError::TemporaryFile { .. })
    ));
    assert!(matches!(
        file.rename("other"),
        Err(FileError::TemporaryFile { .. })
    ));

    // The temp file is still intact and can be discarded normally.
    file.remove_if_tmp().unwrap();
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn rename_moves_a_published_file() {
    let dir = tempdir().unwrap();
    let file = AtomicFile::create(dir.path().join("before")).unwrap();

    file.rename("after").unwrap();
    assert_eq!(file.path(), dir.path().join("after"));
    assert_eq!(dir_entries(dir.path()), vec!["after".to_string()]);
    file.close().unwrap();
}

#[test]
fn move_to_crosses_directories() {
    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let file = AtomicFile::create(dir.path().join("item")).unwrap();

    let target = dir.path().join("sub").join("item");
    file.move_to(&target).unwrap();
    assert_eq!(file.path(), target);
    assert!(exists(&target).unwrap());
    file.close().unwrap();
}

#[test]
fn remove_deletes_a_published_file() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("doomed");
    let file = AtomicFile::create(&target).unwrap();

    file.remove().unwrap();
    assert!(!exists(&target).unwrap());
    assert!(matches!(file.close(), Err(FileError::Closed { .. })));
}

#[test]
fn every_operation_fails_after_close() {
    let dir = tempdir().unwrap();
    let file = AtomicFile::create(dir.path().join("done")).unwrap();
    file.close().unwrap();

    let mut buf = [0u8; 1];
    assert!(matches!(file.read(&mut buf), Err(FileError::Closed { .. })));
    assert!(matches!(file.write(b"x"), Err(FileError::Closed { .. })));
    assert!(matches!(file.size(), Err(FileError::Closed { .. })));
    assert!(matches!(
        file.seek(std::io::SeekFrom::Start(0)),
        Err(FileError::Closed { .. })
    ));
    assert!(matches!(file.close(), Err(FileError::Closed { .. })));
    // The path stays queryable for diagnostics.
    assert!(file.path().ends_with("done"));
}
