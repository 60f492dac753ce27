//! Scratch-directory fixtures.
//!
//! Provides convenience helpers for setting up throwaway directories
//! that transactional files can publish into.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway directory with automatic cleanup.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Creates a fresh scratch directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create scratch directory"),
        }
    }

    /// Returns the root of the scratch directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a path for `name` inside the scratch directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Returns the sorted names of the entries currently present.
    ///
    /// Useful for asserting that a publish left exactly one file and no
    /// temporary litter.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .expect("failed to list scratch directory")
            .map(|entry| {
                entry
                    .expect("failed to read scratch entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` with a fresh scratch directory.
pub fn with_scratch_dir<R>(f: impl FnOnce(&ScratchDir) -> R) -> R {
    f(&ScratchDir::new())
}
