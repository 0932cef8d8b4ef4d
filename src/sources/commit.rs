//! Multi-file commit writer contract.

use std::fmt;
use std::path::PathBuf;

use crate::core::error::TransferError;

/// Identity a commit is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub email: String,
}

impl Actor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Actor {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// What a file operation does. Imports only ever create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
}

/// One file to write in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    pub kind: OperationKind,

    /// Canonical destination path in the repository
    pub target_path: String,

    /// Where the content is read from when the commit is written
    pub source: PathBuf,

    pub executable: bool,
}

impl FileOperation {
    pub fn create(target_path: impl Into<String>, source: impl Into<PathBuf>, executable: bool) -> Self {
        FileOperation {
            kind: OperationKind::Create,
            target_path: target_path.into(),
            source: source.into(),
            executable,
        }
    }
}

/// A single atomic multi-file commit.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Branch to advance
    pub branch: String,

    /// Commit the branch must still point at; `None` if the branch must
    /// still have no commits.
    pub parent: Option<String>,

    pub author: Actor,
    pub message: String,
    pub operations: Vec<FileOperation>,
}

/// Writes commits. Implementations must refuse to advance a branch that has
/// moved away from `CommitRequest::parent`, failing with
/// [`TransferError::Commit`] instead of overwriting.
pub trait CommitWriter {
    /// Create the commit and return its id.
    fn commit_files(&self, request: CommitRequest) -> Result<String, TransferError>;
}
