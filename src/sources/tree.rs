//! Versioned tree reader - read-only access to repository snapshots.

use std::sync::Arc;

use crate::core::error::TransferError;

/// Kind of an entry in a snapshot tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file; `executable` mirrors the tree's file mode
    File { executable: bool },
    Directory,
    Symlink,
    /// A gitlink to another repository
    Submodule,
}

impl EntryKind {
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File { .. })
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// An entry found while walking a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Canonical `/`-separated path from the snapshot root
    pub path: String,
    pub kind: EntryKind,
}

/// A point-in-time view of a repository tree (one commit).
pub trait Snapshot: Send + Sync {
    /// Identifier of the commit this snapshot was taken from.
    fn id(&self) -> String;

    /// Look up a single path. `Ok(None)` means nothing exists there.
    fn entry(&self, path: &str) -> Result<Option<EntryKind>, TransferError>;

    /// Enumerate the full tree recursively, parents before children.
    fn walk(&self) -> Result<Vec<TreeEntry>, TransferError>;

    /// Read a file's content.
    fn read_blob(&self, path: &str) -> Result<Vec<u8>, TransferError>;
}

/// A repository whose history can be read as snapshots.
pub trait VersionedTree {
    /// Repository display name, used when the manifest names no package.
    fn name(&self) -> &str;

    /// Name of the default branch (may have no commits yet).
    fn default_branch(&self) -> Result<String, TransferError>;

    /// Resolve a branch, tag, or commit to a snapshot.
    ///
    /// `None` (or an empty string) selects the default branch.
    fn resolve(&self, reference: Option<&str>) -> Result<Arc<dyn Snapshot>, TransferError>;

    /// Current head of a branch, or `None` if the branch has no commits.
    fn branch_head(&self, branch: &str) -> Result<Option<Arc<dyn Snapshot>>, TransferError>;
}
