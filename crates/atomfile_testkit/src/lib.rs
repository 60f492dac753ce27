//! # Atomfile Testkit
//!
//! Test utilities for atomfile.
//!
//! This crate provides:
//! - Scratch-directory fixtures with automatic cleanup
//! - Property-based test generators using proptest
//! - A reference model of single-cursor file behavior for comparing
//!   against the real transactional handle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atomfile_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_scratch_dir() {
//!     with_scratch_dir(|scratch| {
//!         let path = scratch.path("data.bin");
//!         // ... test operations
//!     });
//! }
//! ```

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
