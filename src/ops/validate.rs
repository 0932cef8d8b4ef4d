//! Validation of a package laid out on disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::archive_path;
use crate::core::error::TransferError;
use crate::core::manifest::{Manifest, MANIFEST_NAME};

/// A package directory whose manifest and references checked out.
#[derive(Debug, Clone)]
pub struct ValidatedPackage {
    pub root: PathBuf,
    pub manifest: Manifest,

    /// Canonical reference set, in declaration order
    pub references: Vec<String>,
}

/// Load `manifest.json` from `root`, validate it, and check that every
/// reference is a regular file under `root`.
///
/// Missing references are reported together, sorted.
pub fn validate_package_dir(root: &Path) -> Result<ValidatedPackage, TransferError> {
    let manifest_path = root.join(MANIFEST_NAME);
    if !is_regular_file(&manifest_path) {
        return Err(TransferError::ManifestMissing {
            location: format!("in {}", root.display()),
        });
    }

    let manifest = Manifest::load(&manifest_path)?;
    let references = manifest.references()?;

    let missing: Vec<String> = references
        .iter()
        .filter(|path| !is_regular_file(&archive_path::to_native(root, path)))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(TransferError::missing_references(missing));
    }

    tracing::debug!(
        "validated {} with {} reference(s)",
        manifest_path.display(),
        references.len()
    );

    Ok(ValidatedPackage {
        root: root.to_path_buf(),
        manifest,
        references,
    })
}

// Symlinks are not followed: a link to a file does not count.
fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
}
