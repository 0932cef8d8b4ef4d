//! uapf - exchange process packages between git repositories
//!
//! This crate provides the library behind the `uapf` tool: manifest
//! validation, streamed archive export from a git ref, and safe,
//! conflict-checked archive import into a branch.

pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test utilities for uapf unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides throwaway git repositories and archive
/// builders.
#[cfg(test)]
pub mod test_support;

pub use core::{Manifest, TransferError};
pub use ops::{export_package, import_package, ExportOptions, ImportOptions, ImportReport};
pub use sources::{Actor, GitRepository};
