//! Core data structures for package transfer.
//!
//! This module contains the foundational types shared by export and import:
//! - The archive path codec (the single definition of a safe relative path)
//! - The manifest document and its reference set
//! - The transfer error taxonomy

pub mod archive_path;
pub mod error;
pub mod manifest;

pub use archive_path::{PathError, PathErrorKind};
pub use error::TransferError;
pub use manifest::{FileRef, Manifest, PackageInfo, ARCHIVE_EXTENSION, MANIFEST_NAME};
