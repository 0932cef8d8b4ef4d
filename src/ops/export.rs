//! Implementation of package export.
//!
//! Validation happens up front, before the producer thread starts, so a
//! manifest problem never produces a single archive byte. The archive itself
//! is written by a background producer into a bounded [`pipe`]; the caller
//! reads it from [`PackageExport::reader`].

use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::error::TransferError;
use crate::core::manifest::{self, Manifest, MANIFEST_NAME};
use crate::ops::cancel::CancelToken;
use crate::ops::pipe::{self, PipeReader, PipeWriter};
use crate::sources::{EntryKind, Snapshot, VersionedTree};
use crate::util::config::{ExportConfig, DEFAULT_CHUNK_SIZE, DEFAULT_PIPE_CAPACITY};

/// Options for exporting a package.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Branch, tag or commit to export (None = default branch)
    pub reference: Option<String>,

    /// Only package the manifest and the files it references
    pub referenced_only: bool,

    /// Chunks buffered between producer and reader
    pub pipe_capacity: usize,

    /// Bytes per chunk
    pub chunk_size: usize,

    pub cancel: CancelToken,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            reference: None,
            referenced_only: false,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancelToken::new(),
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        ExportOptions {
            referenced_only: config.referenced_only(),
            pipe_capacity: config.pipe_capacity(),
            chunk_size: config.chunk_size(),
            ..Default::default()
        }
    }
}

/// A validated export whose archive is being streamed.
pub struct PackageExport {
    /// Suggested archive file name
    pub filename: String,

    /// Commit the archive was taken from
    pub commit: String,

    pub manifest: Manifest,

    /// Archive bytes. Producer errors surface as read errors; see
    /// [`pipe::into_transfer_error`].
    pub reader: PipeReader,
}

impl Read for PackageExport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Export the package at `options.reference` as a streamed `.uapf` archive.
pub fn export_package(
    repo: &dyn VersionedTree,
    options: ExportOptions,
) -> Result<PackageExport, TransferError> {
    let snapshot = repo.resolve(options.reference.as_deref())?;
    let commit = snapshot.id();

    match snapshot.entry(MANIFEST_NAME)? {
        Some(kind) if kind.is_file() => {}
        _ => {
            return Err(TransferError::ManifestMissing {
                location: format!("at the root of commit {}", commit),
            })
        }
    }

    let manifest_bytes = snapshot.read_blob(MANIFEST_NAME)?;
    let manifest = manifest::validate(&manifest_bytes)?;
    let references = manifest.references()?;

    let mut missing = Vec::new();
    for path in &references {
        match snapshot.entry(path)? {
            Some(kind) if kind.is_file() => {}
            _ => missing.push(path.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(TransferError::missing_references(missing));
    }

    let filename = manifest.archive_filename(repo.name());
    tracing::info!(
        "exporting {} ({} reference(s)) from {}",
        filename,
        references.len(),
        commit
    );

    let (writer, reader) = pipe::pipe(options.pipe_capacity, options.chunk_size);
    let job = ArchiveJob {
        snapshot,
        manifest_bytes,
        references,
        referenced_only: options.referenced_only,
        cancel: options.cancel,
    };

    thread::Builder::new()
        .name("uapf-export".to_string())
        .spawn(move || job.run(writer))
        .map_err(|e| TransferError::io("failed to start export producer", e))?;

    Ok(PackageExport {
        filename,
        commit,
        manifest,
        reader,
    })
}

/// Everything the producer thread owns.
struct ArchiveJob {
    snapshot: Arc<dyn Snapshot>,
    manifest_bytes: Vec<u8>,
    references: Vec<String>,
    referenced_only: bool,
    cancel: CancelToken,
}

impl ArchiveJob {
    fn run(self, writer: PipeWriter) {
        let closer = writer.closer();
        let mut zip = ZipWriter::new_stream(writer);

        match self.write_entries(&mut zip) {
            Ok(count) => match zip.finish() {
                Ok(mut inner) => {
                    if let Err(e) = inner.flush() {
                        tracing::debug!("export reader went away: {}", e);
                    } else {
                        tracing::debug!("export stream complete: {} file(s)", count);
                    }
                }
                Err(e) => closer.close_with_error(e.into()),
            },
            Err(err) => {
                tracing::debug!("export aborted: {}", err);
                // Close before the zip writer's drop can finalize anything.
                closer.close_with_error(err);
            }
        }
    }

    fn write_entries<W: Write + std::io::Seek>(
        &self,
        zip: &mut ZipWriter<W>,
    ) -> Result<usize, TransferError> {
        let mut required: HashSet<&str> = self.references.iter().map(String::as_str).collect();

        write_file(zip, MANIFEST_NAME, &self.manifest_bytes, false)?;
        let mut count = 1;

        for entry in self.snapshot.walk()? {
            self.cancel.check()?;

            let path = entry.path.as_str();
            match entry.kind {
                EntryKind::Directory => continue,
                EntryKind::Submodule => {
                    if self.referenced_only && !required.contains(path) {
                        tracing::debug!("skipping unreferenced submodule {}", path);
                        continue;
                    }
                    return Err(TransferError::SubmoduleUnsupported {
                        path: entry.path.clone(),
                    });
                }
                EntryKind::Symlink => {
                    tracing::warn!("skipping symlink {}", path);
                    continue;
                }
                EntryKind::File { executable } => {
                    if path == MANIFEST_NAME {
                        continue;
                    }
                    if self.referenced_only && !required.contains(path) {
                        continue;
                    }

                    let content = self.snapshot.read_blob(path)?;
                    write_file(zip, path, &content, executable)?;
                    required.remove(path);
                    count += 1;
                }
            }
        }

        if !required.is_empty() {
            return Err(TransferError::missing_references(
                required.into_iter().map(str::to_string).collect(),
            ));
        }

        Ok(count)
    }
}

fn write_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &str,
    content: &[u8],
    executable: bool,
) -> Result<(), TransferError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(if executable { 0o755 } else { 0o644 })
        .large_file(content.len() as u64 >= u32::MAX as u64);

    zip.start_file(path, options)?;
    zip.write_all(content)
        .map_err(|e| TransferError::io(format!("failed to write `{}` to archive", path), e))?;

    tracing::trace!("archived {} ({} bytes)", path, content.len());
    Ok(())
}
