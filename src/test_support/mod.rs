//! Test utilities for uapf unit tests.
//!
//! [`TestRepo`] is a throwaway git repository whose history is built
//! directly through git2, without a working tree or the `git` binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use uapf::test_support::TestRepo;
//!
//! #[test]
//! fn test_example() {
//!     let repo = TestRepo::bare("demo");
//!     repo.commit(&[("manifest.json", b"{}".as_slice())]);
//!     assert!(repo.head().is_some());
//! }
//! ```

pub mod fixtures;

use std::path::Path;

use git2::{Index, IndexEntry, IndexTime, Oid, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

// Re-export fixtures for convenience
pub use fixtures::*;

const MODE_BLOB: u32 = 0o100644;
const MODE_BLOB_EXECUTABLE: u32 = 0o100755;
const MODE_LINK: u32 = 0o120000;
const MODE_COMMIT: u32 = 0o160000;

/// A temporary git repository with `main` as its default branch.
pub struct TestRepo {
    _dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    /// Create an empty bare repository named `<name>.git`.
    pub fn bare(name: &str) -> Self {
        Self::init(name, true)
    }

    /// Create an empty repository with a working tree, named `<name>`.
    pub fn with_workdir(name: &str) -> Self {
        Self::init(name, false)
    }

    fn init(name: &str, bare: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let path = if bare {
            dir.path().join(format!("{}.git", name))
        } else {
            dir.path().join(name)
        };

        let mut opts = RepositoryInitOptions::new();
        opts.bare(bare).initial_head("main");
        let repo = Repository::init_opts(&path, &opts).unwrap();

        TestRepo { _dir: dir, repo }
    }

    /// Path to open the repository from.
    pub fn path(&self) -> &Path {
        self.repo.workdir().unwrap_or_else(|| self.repo.path())
    }

    /// Commit regular files on top of `main`, returning the commit id.
    pub fn commit(&self, files: &[(&str, &[u8])]) -> String {
        let entries: Vec<_> = files
            .iter()
            .map(|(path, content)| (*path, self.repo.blob(content).unwrap(), MODE_BLOB))
            .collect();
        self.commit_entries(&entries, "test commit")
    }

    /// Commit a single executable file.
    pub fn commit_executable(&self, path: &str, content: &[u8]) -> String {
        let blob = self.repo.blob(content).unwrap();
        self.commit_entries(&[(path, blob, MODE_BLOB_EXECUTABLE)], "add executable")
    }

    /// Commit a symlink pointing at `target`.
    pub fn commit_symlink(&self, path: &str, target: &str) -> String {
        let blob = self.repo.blob(target.as_bytes()).unwrap();
        self.commit_entries(&[(path, blob, MODE_LINK)], "add symlink")
    }

    /// Commit a gitlink (submodule) entry. Needs at least one earlier commit,
    /// which the gitlink points at.
    pub fn commit_submodule(&self, path: &str) -> String {
        let target = self.head_oid().expect("submodule fixture needs a prior commit");
        self.commit_entries(&[(path, target, MODE_COMMIT)], "add submodule")
    }

    /// Current `main` commit id.
    pub fn head(&self) -> Option<String> {
        self.head_oid().map(|oid| oid.to_string())
    }

    /// Message of the current `main` commit.
    pub fn head_message(&self) -> Option<String> {
        let commit = self.repo.find_commit(self.head_oid()?).ok()?;
        commit.message().map(str::to_string)
    }

    fn head_oid(&self) -> Option<Oid> {
        self.repo
            .find_reference("refs/heads/main")
            .ok()
            .and_then(|r| r.target())
    }

    fn commit_entries(&self, entries: &[(&str, Oid, u32)], message: &str) -> String {
        let parent = self
            .head_oid()
            .map(|oid| self.repo.find_commit(oid).unwrap());

        let mut index = Index::new().unwrap();
        if let Some(parent) = &parent {
            index.read_tree(&parent.tree().unwrap()).unwrap();
        }
        for (path, id, mode) in entries {
            index
                .add(&IndexEntry {
                    ctime: IndexTime::new(0, 0),
                    mtime: IndexTime::new(0, 0),
                    dev: 0,
                    ino: 0,
                    mode: *mode,
                    uid: 0,
                    gid: 0,
                    file_size: 0,
                    id: *id,
                    flags: 0,
                    flags_extended: 0,
                    path: path.as_bytes().to_vec(),
                })
                .unwrap();
        }

        let tree = self
            .repo
            .find_tree(index.write_tree_to(&self.repo).unwrap())
            .unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<_> = parent.iter().collect();

        self.repo
            .commit(Some("refs/heads/main"), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_builds_on_previous_commit() {
        let repo = TestRepo::bare("history");
        assert!(repo.head().is_none());

        let first = repo.commit(&[("a.txt", b"a".as_slice())]);
        let second = repo.commit(&[("b.txt", b"b".as_slice())]);
        assert_ne!(first, second);
        assert_eq!(repo.head(), Some(second));

        let git = Repository::open(repo.path()).unwrap();
        let head = git.head().unwrap().peel_to_tree().unwrap();
        assert!(head.get_path(Path::new("a.txt")).is_ok());
        assert!(head.get_path(Path::new("b.txt")).is_ok());
    }

    #[test]
    fn test_workdir_repository() {
        let repo = TestRepo::with_workdir("checkout");
        assert!(repo.path().ends_with("checkout"));
        assert!(repo.path().is_dir());
    }
}
