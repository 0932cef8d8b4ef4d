//! Repository access.
//!
//! The transfer operations only see two seams: a versioned tree reader
//! used by export and by import's conflict scan, and a commit writer used
//! by import. [`GitRepository`] implements both over a local git repository.

pub mod commit;
pub mod git;
pub mod tree;

pub use commit::{Actor, CommitRequest, CommitWriter, FileOperation, OperationKind};
pub use git::GitRepository;
pub use tree::{EntryKind, Snapshot, TreeEntry, VersionedTree};
