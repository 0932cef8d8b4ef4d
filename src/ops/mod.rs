//! High-level operations.
//!
//! This module contains the export, import and validation operations
//! behind the `uapf` commands.

pub mod cancel;
pub mod export;
pub mod import;
pub mod pipe;
pub mod staging;
pub mod validate;

pub use cancel::CancelToken;
pub use export::{export_package, ExportOptions, PackageExport};
pub use import::{import_package, ImportOptions, ImportReport, ImportStage};
pub use validate::{validate_package_dir, ValidatedPackage};
