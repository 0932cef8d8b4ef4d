//! Git-backed tree reader and commit writer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use git2::{
    Commit, ErrorCode, Index, IndexEntry, IndexTime, Oid, Repository, Signature, TreeWalkMode,
    TreeWalkResult,
};

use crate::core::error::TransferError;
use crate::sources::commit::{Actor, CommitRequest, CommitWriter, OperationKind};
use crate::sources::tree::{EntryKind, Snapshot, TreeEntry, VersionedTree};

const MODE_TREE: i32 = 0o040000;
const MODE_BLOB: i32 = 0o100644;
const MODE_BLOB_EXECUTABLE: i32 = 0o100755;
const MODE_LINK: i32 = 0o120000;
const MODE_COMMIT: i32 = 0o160000;

/// A git repository acting as both tree reader and commit writer.
pub struct GitRepository {
    repo: Repository,
    name: String,
}

impl GitRepository {
    /// Open the repository at exactly `path` (bare or with a working tree).
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let repo = Repository::open(path).map_err(|e| {
            TransferError::repository(format!(
                "failed to open repository at {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        Ok(Self::from_repository(repo))
    }

    /// Find the repository containing `path`, searching parent directories.
    pub fn discover(path: &Path) -> Result<Self, TransferError> {
        let repo = Repository::discover(path).map_err(|e| {
            TransferError::repository(format!(
                "no git repository found at {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        Ok(Self::from_repository(repo))
    }

    fn from_repository(repo: Repository) -> Self {
        let name = repository_name(&repo);
        GitRepository { repo, name }
    }

    /// Working tree root, or the git directory for bare repositories.
    pub fn root(&self) -> &Path {
        self.repo.workdir().unwrap_or_else(|| self.repo.path())
    }

    /// Identity from the repository's git configuration (`user.name`/`user.email`).
    pub fn configured_actor(&self) -> Option<Actor> {
        let sig = self.repo.signature().ok()?;
        Some(Actor::new(sig.name()?, sig.email()?))
    }

    fn snapshot(&self, commit: &Commit<'_>) -> Result<Arc<dyn Snapshot>, TransferError> {
        // Each snapshot owns its handle so it can move to the export producer thread.
        let repo = Repository::open(self.repo.path())?;
        Ok(Arc::new(GitSnapshot {
            repo: Mutex::new(repo),
            commit: commit.id(),
            tree: commit.tree_id(),
        }))
    }

    fn write_commit(&self, request: &CommitRequest) -> Result<Oid, git2::Error> {
        let parent = match &request.parent {
            Some(id) => Some(self.repo.find_commit(Oid::from_str(id)?)?),
            None => None,
        };

        let mut index = Index::new()?;
        if let Some(parent) = &parent {
            index.read_tree(&parent.tree()?)?;
        }

        for op in &request.operations {
            match op.kind {
                OperationKind::Create => {
                    let blob = self.repo.blob_path(&op.source)?;
                    let mode = if op.executable {
                        MODE_BLOB_EXECUTABLE
                    } else {
                        MODE_BLOB
                    };
                    index.add(&index_entry(&op.target_path, blob, mode as u32))?;
                }
            }
        }

        let tree = self.repo.find_tree(index.write_tree_to(&self.repo)?)?;
        let sig = Signature::now(&request.author.name, &request.author.email)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();

        self.repo
            .commit(None, &sig, &sig, &request.message, &tree, &parents)
    }
}

impl VersionedTree for GitRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_branch(&self) -> Result<String, TransferError> {
        let head = self.repo.find_reference("HEAD")?;
        let target = head
            .symbolic_target()
            .ok_or_else(|| TransferError::repository("HEAD is detached; name a branch explicitly"))?;
        Ok(target
            .strip_prefix("refs/heads/")
            .unwrap_or(target)
            .to_string())
    }

    fn resolve(&self, reference: Option<&str>) -> Result<Arc<dyn Snapshot>, TransferError> {
        let spec = match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => r.to_string(),
            None => self.default_branch()?,
        };

        let commit = self
            .repo
            .revparse_single(&spec)
            .and_then(|object| object.peel_to_commit())
            .map_err(|_| TransferError::RefNotFound {
                reference: spec.clone(),
            })?;

        tracing::debug!("resolved `{}` to {}", spec, commit.id());
        self.snapshot(&commit)
    }

    fn branch_head(&self, branch: &str) -> Result<Option<Arc<dyn Snapshot>>, TransferError> {
        let reference = match self.repo.find_reference(&format!("refs/heads/{}", branch)) {
            Ok(r) => r,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let commit = reference.peel_to_commit()?;
        self.snapshot(&commit).map(Some)
    }
}

impl CommitWriter for GitRepository {
    fn commit_files(&self, request: CommitRequest) -> Result<String, TransferError> {
        let refname = format!("refs/heads/{}", request.branch);

        let commit = self
            .write_commit(&request)
            .map_err(|e| TransferError::commit(e.message().to_string()))?;

        let summary = request.message.lines().next().unwrap_or_default();
        let log_message = format!("uapf: {}", summary);

        // Compare-and-swap: the branch must still be where the conflict check saw it.
        let updated = match &request.parent {
            Some(parent) => Oid::from_str(parent).and_then(|expected| {
                self.repo
                    .reference_matching(&refname, commit, true, expected, &log_message)
            }),
            None => self.repo.reference(&refname, commit, false, &log_message),
        };

        if let Err(e) = updated {
            return Err(TransferError::commit(format!(
                "branch `{}` moved since the conflict check: {}",
                request.branch,
                e.message()
            )));
        }

        if !self.repo.is_bare() {
            if let Ok(head) = self.repo.head() {
                if head.name() == Some(refname.as_str()) {
                    tracing::warn!(
                        "branch `{}` is checked out; its working tree was not updated",
                        request.branch
                    );
                }
            }
        }

        tracing::info!(
            "committed {} file(s) to `{}` as {}",
            request.operations.len(),
            request.branch,
            commit
        );

        Ok(commit.to_string())
    }
}

/// A commit's tree, readable from any thread.
struct GitSnapshot {
    repo: Mutex<Repository>,
    commit: Oid,
    tree: Oid,
}

impl GitSnapshot {
    fn lock(&self) -> Result<MutexGuard<'_, Repository>, TransferError> {
        self.repo
            .lock()
            .map_err(|_| TransferError::repository("repository handle poisoned"))
    }
}

impl Snapshot for GitSnapshot {
    fn id(&self) -> String {
        self.commit.to_string()
    }

    fn entry(&self, path: &str) -> Result<Option<EntryKind>, TransferError> {
        let repo = self.lock()?;
        let tree = repo.find_tree(self.tree)?;
        match tree.get_path(Path::new(path)) {
            Ok(entry) => Ok(Some(entry_kind(entry.filemode()))),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn walk(&self) -> Result<Vec<TreeEntry>, TransferError> {
        let repo = self.lock()?;
        let tree = repo.find_tree(self.tree)?;

        let mut entries = Vec::new();
        let mut bad_name = None;

        let walked = tree.walk(TreeWalkMode::PreOrder, |root, entry| match entry.name() {
            Some(name) => {
                entries.push(TreeEntry {
                    path: format!("{}{}", root, name),
                    kind: entry_kind(entry.filemode()),
                });
                TreeWalkResult::Ok
            }
            None => {
                bad_name = Some(format!("{}{}", root, String::from_utf8_lossy(entry.name_bytes())));
                TreeWalkResult::Abort
            }
        });

        if let Some(path) = bad_name {
            return Err(TransferError::repository(format!(
                "tree entry is not valid UTF-8: {}",
                path
            )));
        }
        walked?;

        Ok(entries)
    }

    fn read_blob(&self, path: &str) -> Result<Vec<u8>, TransferError> {
        let repo = self.lock()?;
        let tree = repo.find_tree(self.tree)?;
        let entry = tree.get_path(Path::new(path))?;
        let blob = repo.find_blob(entry.id())?;
        Ok(blob.content().to_vec())
    }
}

fn entry_kind(filemode: i32) -> EntryKind {
    match filemode {
        MODE_TREE => EntryKind::Directory,
        MODE_BLOB_EXECUTABLE => EntryKind::File { executable: true },
        MODE_LINK => EntryKind::Symlink,
        MODE_COMMIT => EntryKind::Submodule,
        _ => EntryKind::File { executable: false },
    }
}

fn index_entry(path: &str, id: Oid, mode: u32) -> IndexEntry {
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode,
        uid: 0,
        gid: 0,
        file_size: 0,
        id,
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}

/// Directory name of the repository, without a trailing `.git`.
fn repository_name(repo: &Repository) -> String {
    let dir: PathBuf = match repo.workdir() {
        Some(workdir) => workdir.to_path_buf(),
        None => repo.path().to_path_buf(),
    };

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "repository".to_string());

    name.strip_suffix(".git")
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn test_repository_name() {
        let repo = TestRepo::bare("repoX");
        let git = GitRepository::open(repo.path()).unwrap();
        assert_eq!(git.name(), "repoX");
        assert_eq!(git.default_branch().unwrap(), "main");
    }

    #[test]
    fn test_resolve_default_branch_and_walk() {
        let repo = TestRepo::bare("walk");
        repo.commit(&[
            ("manifest.json", b"{}".as_slice()),
            ("workflows/a.bpmn", b"<a/>".as_slice()),
        ]);
        repo.commit_executable("bin/run.sh", b"#!/bin/sh\n");

        let git = GitRepository::open(repo.path()).unwrap();
        let snapshot = git.resolve(None).unwrap();

        let entries = snapshot.walk().unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"workflows"));
        assert!(paths.contains(&"workflows/a.bpmn"));

        let workflows = paths.iter().position(|p| *p == "workflows").unwrap();
        let child = paths.iter().position(|p| *p == "workflows/a.bpmn").unwrap();
        assert!(workflows < child);

        assert_eq!(
            snapshot.entry("bin/run.sh").unwrap(),
            Some(EntryKind::File { executable: true })
        );
        assert_eq!(snapshot.entry("workflows").unwrap(), Some(EntryKind::Directory));
        assert_eq!(snapshot.entry("missing.txt").unwrap(), None);
        assert_eq!(snapshot.read_blob("workflows/a.bpmn").unwrap(), b"<a/>");
    }

    #[test]
    fn test_resolve_unknown_ref() {
        let repo = TestRepo::bare("refs");
        repo.commit(&[("a.txt", b"a".as_slice())]);
        let git = GitRepository::open(repo.path()).unwrap();

        match git.resolve(Some("no-such-branch")) {
            Err(TransferError::RefNotFound { reference }) => {
                assert_eq!(reference, "no-such-branch")
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected RefNotFound"),
        }
    }

    #[test]
    fn test_unborn_branch_has_no_head() {
        let repo = TestRepo::bare("empty");
        let git = GitRepository::open(repo.path()).unwrap();
        assert!(git.branch_head("main").unwrap().is_none());
        assert!(matches!(
            git.resolve(None),
            Err(TransferError::RefNotFound { .. })
        ));
    }

    #[test]
    fn test_commit_files_creates_commit() {
        let repo = TestRepo::bare("writer");
        let git = GitRepository::open(repo.path()).unwrap();

        let staged = tempfile::TempDir::new().unwrap();
        let source = staged.path().join("a.bpmn");
        std::fs::write(&source, "<definitions/>").unwrap();

        let commit = git
            .commit_files(CommitRequest {
                branch: "main".to_string(),
                parent: None,
                author: Actor::new("Importer", "importer@example.com"),
                message: "first".to_string(),
                operations: vec![crate::sources::commit::FileOperation::create(
                    "pkg/a.bpmn",
                    &source,
                    false,
                )],
            })
            .unwrap();

        let head = git.branch_head("main").unwrap().unwrap();
        assert_eq!(head.id(), commit);
        assert_eq!(head.read_blob("pkg/a.bpmn").unwrap(), b"<definitions/>");
    }

    #[test]
    fn test_commit_to_checked_out_branch_leaves_worktree() {
        let repo = TestRepo::with_workdir("checkout");
        let git = GitRepository::open(repo.path()).unwrap();
        assert_eq!(git.name(), "checkout");

        let staged = tempfile::TempDir::new().unwrap();
        let source = staged.path().join("a.txt");
        std::fs::write(&source, "a").unwrap();

        git.commit_files(CommitRequest {
            branch: "main".to_string(),
            parent: None,
            author: Actor::new("Importer", "importer@example.com"),
            message: "into checkout".to_string(),
            operations: vec![crate::sources::commit::FileOperation::create(
                "a.txt", &source, false,
            )],
        })
        .unwrap();

        assert!(git.branch_head("main").unwrap().is_some());
        assert!(!repo.path().join("a.txt").exists());
    }

    #[test]
    fn test_commit_files_detects_moved_branch() {
        let repo = TestRepo::bare("race");
        let first = repo.commit(&[("a.txt", b"a".as_slice())]);
        repo.commit(&[("b.txt", b"b".as_slice())]);

        let git = GitRepository::open(repo.path()).unwrap();
        let staged = tempfile::TempDir::new().unwrap();
        let source = staged.path().join("c.txt");
        std::fs::write(&source, "c").unwrap();

        let result = git.commit_files(CommitRequest {
            branch: "main".to_string(),
            parent: Some(first),
            author: Actor::new("Importer", "importer@example.com"),
            message: "stale".to_string(),
            operations: vec![crate::sources::commit::FileOperation::create(
                "c.txt", &source, false,
            )],
        });

        match result {
            Err(TransferError::Commit { message }) => assert!(message.contains("moved")),
            other => panic!("expected commit error, got {other:?}"),
        }

        let head = git.branch_head("main").unwrap().unwrap();
        assert_eq!(head.entry("c.txt").unwrap(), None);
    }
}
