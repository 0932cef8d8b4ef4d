//! Implementation of package import.
//!
//! An import moves through fixed stages. The archive is unpacked into a
//! call-scoped staging directory, re-validated from scratch, checked against
//! the target branch for collisions, and only then committed in one go.
//! Staging is removed on every exit path.

use std::fmt;
use std::io::{Cursor, Read};
use std::path::PathBuf;

use zip::ZipArchive;

use crate::core::archive_path;
use crate::core::error::TransferError;
use crate::ops::cancel::CancelToken;
use crate::ops::staging::{self, Staging};
use crate::ops::validate::validate_package_dir;
use crate::sources::{Actor, CommitRequest, CommitWriter, FileOperation, Snapshot, VersionedTree};
use crate::util::config::{ImportConfig, DEFAULT_MAX_ARCHIVE_SIZE, DEFAULT_MAX_UNPACKED_SIZE};

/// Options for importing a package.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Branch to commit to (None = default branch)
    pub branch: Option<String>,

    /// Directory in the repository to import under ("" = repository root)
    pub target_prefix: String,

    /// Commit message (None = derived from the manifest)
    pub message: Option<String>,

    pub max_archive_size: u64,
    pub max_unpacked_size: u64,

    /// Parent directory for the staging area (None = system temp dir)
    pub staging_dir: Option<PathBuf>,

    pub cancel: CancelToken,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            branch: None,
            target_prefix: String::new(),
            message: None,
            max_archive_size: DEFAULT_MAX_ARCHIVE_SIZE,
            max_unpacked_size: DEFAULT_MAX_UNPACKED_SIZE,
            staging_dir: None,
            cancel: CancelToken::new(),
        }
    }
}

impl ImportOptions {
    pub fn from_config(config: &ImportConfig) -> Self {
        ImportOptions {
            max_archive_size: config.max_archive_size(),
            max_unpacked_size: config.max_unpacked_size(),
            staging_dir: config.staging_dir.clone(),
            ..Default::default()
        }
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Id of the new commit
    pub commit: String,
    pub branch: String,
    pub package_name: Option<String>,
    pub package_version: Option<String>,

    /// Repository paths created, sorted
    pub files: Vec<String>,
}

/// Where an import currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Parsing,
    Extracting,
    RootDetection,
    Validating,
    ConflictCheck,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImportStage::Parsing => "parsing",
            ImportStage::Extracting => "extracting",
            ImportStage::RootDetection => "root detection",
            ImportStage::Validating => "validating",
            ImportStage::ConflictCheck => "conflict check",
            ImportStage::Committing => "committing",
            ImportStage::Done => "done",
            ImportStage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

struct Progress {
    stage: ImportStage,
}

impl Progress {
    fn enter(&mut self, stage: ImportStage) {
        tracing::debug!("import: {} -> {}", self.stage, stage);
        self.stage = stage;
    }
}

/// Import a `.uapf` archive into `tree` and commit it through `writer`.
///
/// `declared_size`, when known, is checked against the limit before any
/// bytes are read. Nothing is committed unless every check passes.
pub fn import_package(
    tree: &dyn VersionedTree,
    writer: &dyn CommitWriter,
    actor: &Actor,
    archive: &mut dyn Read,
    declared_size: Option<u64>,
    options: ImportOptions,
) -> Result<ImportReport, TransferError> {
    let mut progress = Progress {
        stage: ImportStage::Parsing,
    };
    let mut staging = None;

    let result = run(
        tree,
        writer,
        actor,
        archive,
        declared_size,
        &options,
        &mut progress,
        &mut staging,
    );

    if let Some(staging) = staging {
        if let Err(e) = staging.close() {
            tracing::warn!("{}", e);
        }
    }

    match &result {
        Ok(report) => {
            progress.enter(ImportStage::Done);
            tracing::info!(
                "imported {} file(s) into `{}` as {}",
                report.files.len(),
                report.branch,
                report.commit
            );
        }
        Err(err) => {
            tracing::debug!("import failed during {}: {}", progress.stage, err);
            progress.enter(ImportStage::Failed);
        }
    }

    result
}

#[allow(clippy::too_many_arguments)]
fn run(
    tree: &dyn VersionedTree,
    writer: &dyn CommitWriter,
    actor: &Actor,
    archive: &mut dyn Read,
    declared_size: Option<u64>,
    options: &ImportOptions,
    progress: &mut Progress,
    staging: &mut Option<Staging>,
) -> Result<ImportReport, TransferError> {
    let limit = options.max_archive_size;
    let too_large = || TransferError::SizeLimitExceeded {
        what: "archive".to_string(),
        limit,
    };

    if declared_size.is_some_and(|size| size > limit) {
        return Err(too_large());
    }

    let mut bytes = Vec::new();
    archive
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| TransferError::io("failed to read archive", e))?;
    if bytes.len() as u64 > limit {
        return Err(too_large());
    }

    let mut zip = ZipArchive::new(Cursor::new(bytes))?;

    progress.enter(ImportStage::Extracting);
    let staging = staging.insert(Staging::create(options.staging_dir.as_deref())?);
    let stats = staging.extract(&mut zip, options.max_unpacked_size, &options.cancel)?;
    tracing::debug!("extracted {} file(s), {} bytes", stats.files, stats.bytes);

    progress.enter(ImportStage::RootDetection);
    let root = staging.package_root()?;

    // Never trust the archive, even one this tool exported.
    progress.enter(ImportStage::Validating);
    let package = validate_package_dir(&root)?;
    let prefix = archive_path::normalize_prefix(&options.target_prefix)?;

    progress.enter(ImportStage::ConflictCheck);
    let branch = match options.branch.as_deref().map(str::trim) {
        Some(branch) if !branch.is_empty() => branch.to_string(),
        _ => tree.default_branch()?,
    };
    let head = tree.branch_head(&branch)?;

    let files = staging::package_files(&root)?;
    let destinations: Vec<String> = files
        .iter()
        .map(|f| archive_path::join(&prefix, &f.relative))
        .collect();

    if let Some(head) = &head {
        let conflicts = find_conflicts(head.as_ref(), &destinations)?;
        if !conflicts.is_empty() {
            return Err(TransferError::conflicts(conflicts));
        }
    }

    options.cancel.check()?;

    progress.enter(ImportStage::Committing);
    let operations: Vec<FileOperation> = files
        .iter()
        .zip(&destinations)
        .map(|(file, dest)| FileOperation::create(dest.clone(), file.path.clone(), file.executable))
        .collect();

    let message = match options.message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => package.manifest.default_import_message(tree.name()),
    };

    let commit = writer.commit_files(CommitRequest {
        branch: branch.clone(),
        parent: head.as_ref().map(|h| h.id()),
        author: actor.clone(),
        message,
        operations,
    })?;

    let mut created = destinations;
    created.sort();

    Ok(ImportReport {
        commit,
        branch,
        package_name: package.manifest.package_name().map(str::to_string),
        package_version: package.manifest.package_version().map(str::to_string),
        files: created,
    })
}

/// Every destination that collides with the current tree: the path itself
/// exists, or one of its ancestors exists as something other than a directory.
fn find_conflicts(head: &dyn Snapshot, destinations: &[String]) -> Result<Vec<String>, TransferError> {
    let mut conflicts = Vec::new();

    for dest in destinations {
        if head.entry(dest)?.is_some() {
            conflicts.push(dest.clone());
            continue;
        }
        for ancestor in archive_path::ancestors(dest) {
            match head.entry(ancestor)? {
                Some(kind) if !kind.is_dir() => {
                    conflicts.push(dest.clone());
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    Ok(conflicts)
}
