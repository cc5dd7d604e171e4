//! staging::builder
//!
//! Build a commit straight against a repository, without a file system
//! handle or node cache. Suited to importing many files at once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::snapshot::EntryRef;
use crate::core::types::{BranchName, FileMode, Oid, RefName, Signature};
use crate::gfs::GfsError;
use crate::git::{NewCommit, Repository};

use super::editor::CacheEditor;
use super::index::StagingIndex;

#[derive(Debug, Clone)]
enum Op {
    File {
        path: Vec<u8>,
        bytes: Vec<u8>,
        mode: FileMode,
    },
    Delete(Vec<u8>),
    DeleteTree(Vec<u8>),
    Import { dest: Vec<u8>, dir: PathBuf },
}

/// Collects file operations and records them as one commit on a branch.
///
/// Operations are queued by the chained methods and only touch the
/// repository in [`CommitBuilder::execute`]. They apply in call order on
/// top of the parent's tree, so a later operation on a path wins.
///
/// ```
/// use std::sync::Arc;
/// use gitvfs::git::{MemoryRepo, ObjectStore};
/// use gitvfs::staging::CommitBuilder;
///
/// let repo = Arc::new(MemoryRepo::new().with_identity("Jane", "jane@example.com"));
/// let commit = CommitBuilder::new(repo.clone())
///     .on_branch("main")
///     .add_file("docs/readme.md", "hello\n")
///     .add_executable("bin/run", "#!/bin/sh\n")
///     .message("import")
///     .execute()
///     .unwrap();
/// assert_eq!(repo.read_commit(&commit).unwrap().message, "import\n");
/// ```
pub struct CommitBuilder {
    repo: Arc<dyn Repository>,
    branch: Option<String>,
    parent: Option<Oid>,
    ops: Vec<Op>,
    message: Option<String>,
    author: Option<Signature>,
    committer: Option<Signature>,
}

impl std::fmt::Debug for CommitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitBuilder")
            .field("branch", &self.branch)
            .field("parent", &self.parent)
            .field("ops", &self.ops.len())
            .finish_non_exhaustive()
    }
}

impl CommitBuilder {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            branch: None,
            parent: None,
            ops: Vec::new(),
            message: None,
            author: None,
            committer: None,
        }
    }

    /// Branch to commit on. Defaults to the repository's head branch.
    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Parent commit. Defaults to the branch tip; none for a new branch.
    pub fn parent(mut self, parent: Oid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn add_file(self, path: impl AsRef<[u8]>, bytes: impl Into<Vec<u8>>) -> Self {
        self.push_file(path, bytes, FileMode::Regular)
    }

    pub fn add_executable(self, path: impl AsRef<[u8]>, bytes: impl Into<Vec<u8>>) -> Self {
        self.push_file(path, bytes, FileMode::Executable)
    }

    /// Add a symbolic link pointing at `target`.
    pub fn add_symlink(self, path: impl AsRef<[u8]>, target: impl AsRef<[u8]>) -> Self {
        self.push_file(path, target.as_ref(), FileMode::Symlink)
    }

    pub fn delete(mut self, path: impl AsRef<[u8]>) -> Self {
        self.ops.push(Op::Delete(path.as_ref().to_vec()));
        self
    }

    pub fn delete_tree(mut self, path: impl AsRef<[u8]>) -> Self {
        self.ops.push(Op::DeleteTree(path.as_ref().to_vec()));
        self
    }

    /// Add every file under the local directory `dir` beneath `dest`.
    ///
    /// The directory is read when the commit is built. `.git` directories
    /// are skipped, symlinks are stored as links, and on unix the
    /// executable bit is kept.
    pub fn import_directory(mut self, dest: impl AsRef<[u8]>, dir: impl AsRef<Path>) -> Self {
        self.ops.push(Op::Import {
            dest: dest.as_ref().to_vec(),
            dir: dir.as_ref().to_path_buf(),
        });
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    fn push_file(mut self, path: impl AsRef<[u8]>, bytes: impl Into<Vec<u8>>, mode: FileMode) -> Self {
        self.ops.push(Op::File {
            path: path.as_ref().to_vec(),
            bytes: bytes.into(),
            mode,
        });
        self
    }

    /// Write the objects, then move the branch to the new commit.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a bad path or a missing message
    /// - `NoBranch` when no branch is given and the repository has no head
    /// - `NoIdentity` when no committer can be found
    /// - `RefUpdateRejected` when the branch moved while building
    pub fn execute(&self) -> Result<Oid, GfsError> {
        let repo = &*self.repo;
        let message = self
            .message
            .as_ref()
            .ok_or_else(|| GfsError::InvalidArgument("a commit message is required".to_string()))?;
        let branch = match &self.branch {
            Some(name) => BranchName::new(name.as_str())?,
            None => repo
                .head_branch()?
                .ok_or_else(|| GfsError::NoBranch("HEAD".to_string()))?,
        };
        let refname = RefName::for_branch(&branch);
        let tip = repo.resolve_ref(&refname)?;
        let parent = self.parent.clone().or_else(|| tip.clone());

        let mut index = match &parent {
            Some(parent) => StagingIndex::from_tree(repo, &repo.read_commit(parent)?.tree)?,
            None => StagingIndex::new(),
        };
        for op in &self.ops {
            let edits = self.edits_for(op)?;
            index.apply(repo, edits)?;
        }
        let tree = index.write_tree(repo)?;

        let committer = match &self.committer {
            Some(committer) => committer.clone(),
            None => repo
                .default_identity()
                .map(|sig| sig.renewed())
                .ok_or(GfsError::NoIdentity)?,
        };
        let author = self.author.clone().unwrap_or_else(|| committer.clone());
        let summary = message.lines().next().unwrap_or("");
        let reflog = match parent {
            Some(_) => format!("commit: {summary}"),
            None => format!("commit (initial): {summary}"),
        };

        let commit = repo.write_commit(&NewCommit {
            tree,
            parents: parent.into_iter().collect(),
            author,
            committer,
            message: if message.ends_with('\n') {
                message.clone()
            } else {
                format!("{message}\n")
            },
        })?;
        repo.flush()?;
        repo.update_ref_cas(&refname, &commit, tip.as_ref(), &reflog)?;

        tracing::debug!(branch = %branch, commit = %commit.short(7), files = index.len(), "built commit");
        Ok(commit)
    }

    fn edits_for(&self, op: &Op) -> Result<Vec<CacheEditor>, GfsError> {
        let repo = &*self.repo;
        match op {
            Op::File { path, bytes, mode } => {
                let entry = EntryRef::new(repo.write_blob(bytes)?, *mode);
                Ok(vec![CacheEditor::add_entry(path, entry)?])
            }
            Op::Delete(path) => Ok(vec![CacheEditor::delete_entry(path)?]),
            Op::DeleteTree(path) => Ok(vec![CacheEditor::delete_tree(path)?]),
            Op::Import { dest, dir } => {
                let mut files = Vec::new();
                read_local(dir, dest, &mut files)?;
                files
                    .into_iter()
                    .map(|(path, bytes, mode)| {
                        let entry = EntryRef::new(repo.write_blob(&bytes)?, mode);
                        CacheEditor::add_entry(&path, entry)
                    })
                    .collect()
            }
        }
    }
}

/// Collect `(path, bytes, mode)` for every file under `dir`.
fn read_local(
    dir: &Path,
    prefix: &[u8],
    out: &mut Vec<(Vec<u8>, Vec<u8>, FileMode)>,
) -> Result<(), GfsError> {
    let mut children = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(|child| child.file_name());
    for child in children {
        let name = os_bytes(&child.file_name());
        if name == b".git" {
            continue;
        }
        let mut path = prefix.to_vec();
        if !path.is_empty() && !path.ends_with(b"/") {
            path.push(b'/');
        }
        path.extend_from_slice(&name);

        let kind = child.file_type()?;
        if kind.is_dir() {
            read_local(&child.path(), &path, out)?;
        } else if kind.is_symlink() {
            let target = fs::read_link(child.path())?;
            out.push((path, os_bytes(target.as_os_str()), FileMode::Symlink));
        } else {
            let mode = if is_executable(&child.metadata()?) {
                FileMode::Executable
            } else {
                FileMode::Regular
            };
            out.push((path, fs::read(child.path())?, mode));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn os_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn os_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    name.to_string_lossy().replace('\\', "/").into_bytes()
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}
