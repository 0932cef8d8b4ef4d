//! Call-scoped staging area for untrusted archives.
//!
//! Each import gets a fresh temporary directory. Entries are written only
//! after their names pass [`archive_path::normalize`] and their parent
//! directory, once created, canonicalizes to somewhere inside the staging
//! root. The directory is removed when the [`Staging`] value is dropped.

use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::core::archive_path::{self, PathErrorKind};
use crate::core::error::TransferError;
use crate::core::manifest::MANIFEST_NAME;
use crate::ops::cancel::CancelToken;
use crate::util::fs as fs_util;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// A file found under the package root after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Canonical path relative to the package root
    pub relative: String,

    /// Location on disk
    pub path: PathBuf,

    pub executable: bool,
}

/// Totals from one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files: usize,
    pub bytes: u64,
}

/// Ephemeral extraction directory owned by a single import.
pub struct Staging {
    dir: TempDir,
    root: PathBuf,
}

impl Staging {
    /// Create a staging directory, under `parent` if given, otherwise in the
    /// system temp directory.
    pub fn create(parent: Option<&Path>) -> Result<Self, TransferError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("uapf-import-");

        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| {
                    TransferError::io(format!("failed to create {}", parent.display()), e)
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| TransferError::io("failed to create staging directory", e))?;

        let root = dir
            .path()
            .canonicalize()
            .map_err(|e| TransferError::io("failed to resolve staging directory", e))?;

        tracing::debug!("staging import in {}", root.display());
        Ok(Staging { dir, root })
    }

    /// Canonical staging root.
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Extract every entry of `archive` into the staging root.
    ///
    /// Fails on unsafe names, symlink entries, duplicate entries, or when the
    /// decompressed total would exceed `max_unpacked_size`.
    pub fn extract<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        max_unpacked_size: u64,
        cancel: &CancelToken,
    ) -> Result<ExtractStats, TransferError> {
        let mut stats = ExtractStats::default();

        for idx in 0..archive.len() {
            cancel.check()?;

            let mut entry = archive.by_index(idx)?;
            let raw = entry.name().to_string();

            let canonical = match archive_path::normalize(&raw) {
                Ok(path) => path,
                // A bare "./" directory entry carries nothing.
                Err(e) if entry.is_dir() && e.kind == PathErrorKind::Empty => continue,
                Err(e) => return Err(e.into()),
            };

            if entry
                .unix_mode()
                .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
            {
                return Err(TransferError::archive_format(format!(
                    "symbolic link entries are not allowed: `{}`",
                    raw
                )));
            }

            for ancestor in archive_path::ancestors(&canonical) {
                let path = archive_path::to_native(&self.root, ancestor);
                if path.is_file() {
                    return Err(TransferError::archive_format(format!(
                        "entry `{}` is nested under file `{}`",
                        canonical, ancestor
                    )));
                }
            }

            let dest = archive_path::to_native(&self.root, &canonical);

            if entry.is_dir() {
                if dest.is_file() {
                    return Err(TransferError::archive_format(format!(
                        "duplicate entry `{}`",
                        canonical
                    )));
                }
                self.create_dirs(&dest)?;
                continue;
            }

            let parent = dest.parent().unwrap_or(&self.root);
            self.create_dirs(parent)?;

            let mut out = match fs_util::create_new(&dest) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Err(TransferError::archive_format(format!(
                        "duplicate entry `{}`",
                        canonical
                    )))
                }
                Err(e) => {
                    return Err(TransferError::io(
                        format!("failed to create {}", dest.display()),
                        e,
                    ))
                }
            };

            let budget = max_unpacked_size - stats.bytes;
            let mut limited = entry.by_ref().take(budget.saturating_add(1));
            let copied = copy_entry(&mut limited, &mut out, &canonical, &dest)?;
            if copied > budget {
                return Err(TransferError::SizeLimitExceeded {
                    what: "unpacked archive contents".to_string(),
                    limit: max_unpacked_size,
                });
            }
            drop(out);

            let executable = entry.unix_mode().is_some_and(|mode| mode & 0o111 != 0);
            fs_util::set_executable(&dest, executable)
                .map_err(|e| TransferError::io(format!("failed to set mode on `{}`", canonical), e))?;

            tracing::trace!("staged {} ({} bytes)", canonical, copied);
            stats.files += 1;
            stats.bytes += copied;
        }

        Ok(stats)
    }

    /// Find the package root: the staging root itself if it holds the
    /// manifest, or its single top-level directory if that one does.
    pub fn package_root(&self) -> Result<PathBuf, TransferError> {
        if self.root.join(MANIFEST_NAME).is_file() {
            return Ok(self.root.clone());
        }

        let entries = fs::read_dir(&self.root)
            .map_err(|e| TransferError::io("failed to read staging directory", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransferError::io("failed to read staging directory", e))?;

        if let [only] = entries.as_slice() {
            let wrapper = only.path();
            if wrapper.is_dir() && wrapper.join(MANIFEST_NAME).is_file() {
                return Ok(wrapper);
            }
        }

        Err(TransferError::ManifestMissing {
            location: "at the archive root or inside a single top-level directory".to_string(),
        })
    }

    /// Remove the staging directory now, reporting failures.
    pub fn close(self) -> Result<(), TransferError> {
        self.dir
            .close()
            .map_err(|e| TransferError::io("failed to remove staging directory", e))
    }

    fn create_dirs(&self, dir: &Path) -> Result<(), TransferError> {
        fs::create_dir_all(dir)
            .map_err(|e| TransferError::io(format!("failed to create {}", dir.display()), e))?;

        let resolved = dir
            .canonicalize()
            .map_err(|e| TransferError::io(format!("failed to resolve {}", dir.display()), e))?;
        if !fs_util::is_inside(&resolved, &self.root) {
            return Err(TransferError::Path {
                path: dir.display().to_string(),
                reason: "resolves outside the staging directory".to_string(),
            });
        }

        Ok(())
    }
}

/// Copy one entry's decompressed bytes into `out`.
///
/// Decoding failures (bad deflate data, checksum mismatch) are archive
/// format errors; failures writing `out` stay I/O errors.
fn copy_entry(
    entry: &mut impl Read,
    out: &mut impl Write,
    name: &str,
    dest: &Path,
) -> Result<u64, TransferError> {
    let mut buf = [0u8; 8 * 1024];
    let mut copied = 0u64;

    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput) => {
                return Err(TransferError::archive_format(format!(
                    "corrupt entry `{}`: {}",
                    name, e
                )))
            }
            Err(e) => return Err(TransferError::io(format!("failed to extract `{}`", name), e)),
        };

        out.write_all(&buf[..n])
            .map_err(|e| TransferError::io(format!("failed to write {}", dest.display()), e))?;
        copied += n as u64;
    }

    Ok(copied)
}

/// Every regular file under `root`, sorted by path.
pub fn package_files(root: &Path) -> Result<Vec<StagedFile>, TransferError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let context = format!("failed to walk {}", root.display());
            match e.into_io_error() {
                Some(io) => TransferError::io(context, io),
                None => TransferError::archive_format(context),
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .ok()
            .and_then(archive_path::from_native)
            .ok_or_else(|| {
                TransferError::archive_format(format!(
                    "unrepresentable path {}",
                    entry.path().display()
                ))
            })?;

        let metadata = entry
            .metadata()
            .map_err(|e| TransferError::archive_format(e.to_string()))?;

        files.push(StagedFile {
            relative,
            path: entry.path().to_path_buf(),
            executable: fs_util::is_executable(&metadata),
        });
    }

    Ok(files)
}
