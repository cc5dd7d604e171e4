//! git::interface
//!
//! Repository implementation backed by git2.
//!
//! This module is the **single doorway** to libgit2. No other module
//! imports `git2` directly; everything above talks to the [`Repository`]
//! traits and receives the crate's own strong types.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: Not inside a Git repository
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::ObjectNotFound`]: Requested object does not exist
//! - [`GitError::CasFailed`]: Compare-and-swap precondition failed
//!
//! # Example
//!
//! ```no_run
//! use gitvfs::git::{Git, RefStore};
//! use gitvfs::core::types::RefName;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new(".")).unwrap();
//! let main = RefName::new("refs/heads/main").unwrap();
//! if let Some(oid) = git.resolve_ref(&main).unwrap() {
//!     println!("main is at {}", oid.short(7));
//! }
//! ```
//!
//! [`Repository`]: super::Repository

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::core::snapshot::{BlobSnapshot, TreeEntry, TreeSnapshot};
use crate::core::types::{BranchName, FileMode, Oid, RefName, Signature, TypeError};

use super::store::{
    CommitGraph, CommitInfo, NewCommit, ObjectStore, RefEntry, RefStore, StashEntry,
};

/// Errors from repository operations.
///
/// The categorization lets higher layers tell "this does not exist" apart
/// from "someone else moved the ref" apart from genuine failures.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref's current value did not match the value the caller last
    /// observed, so the update was refused.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The actual current value
        actual: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// The object exists but has a different type.
    #[error("object {oid} is not a {expected}")]
    WrongObjectType {
        oid: String,
        expected: &'static str,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// A stored object could not be interpreted.
    #[error("corrupt object {oid}: {message}")]
    Corrupt { oid: String, message: String },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context == "HEAD" {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) | TypeError::InvalidBranchName(msg) => {
                GitError::InvalidRefName { message: msg }
            }
            TypeError::InvalidFileMode(mode) => GitError::Corrupt {
                oid: String::new(),
                message: format!("unknown file mode {mode:o}"),
            },
        }
    }
}

fn git2_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn oid_from(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::from_raw(oid.as_bytes()).map_err(GitError::from)
}

fn to_signature(sig: &git2::Signature<'_>) -> Signature {
    Signature::at(
        String::from_utf8_lossy(sig.name_bytes()),
        String::from_utf8_lossy(sig.email_bytes()),
        sig.when().seconds(),
    )
}

fn to_git2_signature(sig: &Signature) -> Result<git2::Signature<'static>, GitError> {
    let time = git2::Time::new(sig.when.timestamp(), 0);
    git2::Signature::new(&sig.name, &sig.email, &time).map_err(GitError::from)
}

/// The git2-backed repository.
///
/// One `git2::Repository` handle serves every caller, guarded by a mutex so
/// the handle is safe to share between threads.
///
/// # CAS Semantics
///
/// All ref mutations use compare-and-swap. An update only succeeds if the
/// ref still holds the value the caller expects, which makes the ref update
/// the linearization point between independent file system handles.
pub struct Git {
    repo: Mutex<git2::Repository>,
    git_dir: PathBuf,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git").field("git_dir", &self.git_dir).finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    /// Open the repository containing `path`.
    ///
    /// Uses `git2::Repository::discover`, so `path` can be any directory
    /// within the repository. Bare repositories are accepted.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self::wrap(repo))
    }

    /// Create a new bare repository at `path`.
    pub fn init_bare(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::init_bare(path).map_err(|e| GitError::AccessError {
            message: format!("{}: {}", path.display(), e.message()),
        })?;
        Ok(Self::wrap(repo))
    }

    fn wrap(repo: git2::Repository) -> Self {
        let git_dir = repo.path().to_path_buf();
        tracing::debug!(git_dir = %git_dir.display(), "opened repository");
        Self {
            repo: Mutex::new(repo),
            git_dir,
        }
    }

    /// The repository's git directory (`.git` or the bare repository root).
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn lock(&self) -> Result<MutexGuard<'_, git2::Repository>, GitError> {
        self.repo.lock().map_err(|_| GitError::Internal {
            message: "repository mutex poisoned".to_string(),
        })
    }

    /// Current raw target of a ref, without peeling.
    fn raw_target(repo: &git2::Repository, refname: &str) -> Result<Option<git2::Oid>, GitError> {
        match repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference.resolve().map_err(|e| GitError::from_git2(e, refname))?;
                resolved.target().map(Some).ok_or_else(|| GitError::Internal {
                    message: format!("ref {} has no target", refname),
                })
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    /// Compare-and-swap under an already held repository lock.
    fn cas_update(
        repo: &git2::Repository,
        refname: &str,
        new_id: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let current = Self::raw_target(repo, refname)?;
        let cas_failed = |actual: String| GitError::CasFailed {
            refname: refname.to_string(),
            expected: expected_old.map_or_else(|| "<none>".to_string(), Oid::to_string),
            actual,
        };

        match (expected_old, current) {
            (Some(expected), Some(actual)) if expected.as_str() != actual.to_string() => {
                return Err(cas_failed(actual.to_string()));
            }
            (Some(_), None) => return Err(cas_failed("<none>".to_string())),
            (None, Some(actual)) => return Err(cas_failed(actual.to_string())),
            _ => {}
        }

        let target = git2_oid(new_id)?;
        let result = match current {
            Some(current) => repo.reference_matching(refname, target, true, current, message),
            None => repo.reference(refname, target, false, message),
        };
        match result {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.code(), git2::ErrorCode::Exists | git2::ErrorCode::Modified) => {
                Err(cas_failed("<concurrently modified>".to_string()))
            }
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }
}

impl ObjectStore for Git {
    fn has_object(&self, id: &Oid) -> Result<bool, GitError> {
        let oid = git2_oid(id)?;
        let repo = self.lock()?;
        let odb = repo.odb()?;
        Ok(odb.exists(oid))
    }

    fn read_blob(&self, id: &Oid) -> Result<BlobSnapshot, GitError> {
        let oid = git2_oid(id)?;
        let repo = self.lock()?;
        let blob = repo
            .find_blob(oid)
            .map_err(|e| GitError::from_git2(e, id.as_str()))?;
        Ok(BlobSnapshot::new(id.clone(), blob.content().to_vec()))
    }

    fn read_tree(&self, id: &Oid) -> Result<TreeSnapshot, GitError> {
        let oid = git2_oid(id)?;
        let repo = self.lock()?;
        let tree = repo
            .find_tree(oid)
            .map_err(|e| GitError::from_git2(e, id.as_str()))?;

        let mut entries = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let mode = FileMode::from_value(entry.filemode() as u32).map_err(|_| {
                GitError::Corrupt {
                    oid: id.to_string(),
                    message: format!("unknown file mode {:o}", entry.filemode()),
                }
            })?;
            entries.push(TreeEntry::new(
                entry.name_bytes().to_vec(),
                oid_from(entry.id())?,
                mode,
            ));
        }
        Ok(TreeSnapshot::new(id.clone(), entries))
    }

    fn read_commit(&self, id: &Oid) -> Result<CommitInfo, GitError> {
        let oid = git2_oid(id)?;
        let repo = self.lock()?;
        let commit = repo
            .find_commit(oid)
            .map_err(|e| GitError::from_git2(e, id.as_str()))?;

        let parents = commit
            .parent_ids()
            .map(oid_from)
            .collect::<Result<Vec<_>, _>>()?;

        let info = CommitInfo {
            id: id.clone(),
            tree: oid_from(commit.tree_id())?,
            parents,
            author: to_signature(&commit.author()),
            committer: to_signature(&commit.committer()),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        };
        Ok(info)
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<Oid, GitError> {
        let repo = self.lock()?;
        let oid = repo.blob(bytes)?;
        tracing::trace!(%oid, len = bytes.len(), "wrote blob");
        oid_from(oid)
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid, GitError> {
        let repo = self.lock()?;
        let mut builder = repo.treebuilder(None)?;
        for entry in entries {
            builder.insert(
                entry.name.clone(),
                git2_oid(&entry.id)?,
                entry.mode.to_value() as i32,
            )?;
        }
        oid_from(builder.write()?)
    }

    fn write_commit(&self, commit: &NewCommit) -> Result<Oid, GitError> {
        let repo = self.lock()?;
        let tree = repo
            .find_tree(git2_oid(&commit.tree)?)
            .map_err(|e| GitError::from_git2(e, commit.tree.as_str()))?;
        let parents = commit
            .parents
            .iter()
            .map(|p| {
                repo.find_commit(git2_oid(p)?)
                    .map_err(|e| GitError::from_git2(e, p.as_str()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let oid = repo.commit(
            None,
            &to_git2_signature(&commit.author)?,
            &to_git2_signature(&commit.committer)?,
            &commit.message,
            &tree,
            &parent_refs,
        )?;
        oid_from(oid)
    }

    fn flush(&self) -> Result<(), GitError> {
        // libgit2 writes loose objects synchronously.
        Ok(())
    }
}

impl RefStore for Git {
    fn resolve_ref(&self, name: &RefName) -> Result<Option<Oid>, GitError> {
        let repo = self.lock()?;
        let reference = match repo.find_reference(name.as_str()) {
            Ok(reference) => reference,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, name.as_str())),
        };
        let oid = match reference.peel_to_commit() {
            Ok(commit) => commit.id(),
            Err(_) => match Self::raw_target(&repo, name.as_str())? {
                Some(oid) => oid,
                None => return Ok(None),
            },
        };
        oid_from(oid).map(Some)
    }

    fn update_ref_cas(
        &self,
        name: &RefName,
        new_id: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let repo = self.lock()?;
        Self::cas_update(&repo, name.as_str(), new_id, expected_old, message)?;
        tracing::info!(refname = %name, to = %new_id.short(7), "updated ref");
        Ok(())
    }

    fn delete_ref_cas(&self, name: &RefName, expected_old: &Oid) -> Result<(), GitError> {
        let repo = self.lock()?;
        match Self::raw_target(&repo, name.as_str())? {
            None => {
                return Err(GitError::RefNotFound {
                    refname: name.to_string(),
                });
            }
            Some(actual) if actual.to_string() != expected_old.as_str() => {
                return Err(GitError::CasFailed {
                    refname: name.to_string(),
                    expected: expected_old.to_string(),
                    actual: actual.to_string(),
                });
            }
            _ => {}
        }

        let mut reference = repo
            .find_reference(name.as_str())
            .map_err(|e| GitError::from_git2(e, name.as_str()))?;
        reference
            .delete()
            .map_err(|e| GitError::from_git2(e, name.as_str()))?;
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<RefEntry>, GitError> {
        let repo = self.lock()?;
        let refs = repo.references_glob(&format!("{}*", prefix))?;

        let mut entries = Vec::new();
        for reference in refs {
            let reference = reference?;

            // Skip refs with non-UTF8 or otherwise invalid names
            let Some(name) = reference.name().and_then(|n| RefName::new(n).ok()) else {
                continue;
            };

            let oid = match reference.peel_to_commit() {
                Ok(commit) => commit.id(),
                Err(_) => match reference.target() {
                    Some(oid) => oid,
                    None => continue,
                },
            };
            entries.push(RefEntry {
                name,
                id: oid_from(oid)?,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn head_branch(&self) -> Result<Option<BranchName>, GitError> {
        let repo = self.lock()?;
        let head = match repo.find_reference("HEAD") {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };
        Ok(head
            .symbolic_target()
            .and_then(|target| target.strip_prefix(RefName::HEADS))
            .and_then(|name| BranchName::new(name).ok()))
    }

    fn push_stash(
        &self,
        id: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let repo = self.lock()?;
        repo.reference_ensure_log(RefName::STASH)?;
        Self::cas_update(&repo, RefName::STASH, id, expected_old, message)
    }

    fn stash_entries(&self) -> Result<Vec<StashEntry>, GitError> {
        let repo = self.lock()?;
        let reflog = repo.reflog(RefName::STASH)?;
        reflog
            .iter()
            .enumerate()
            .map(|(index, entry)| -> Result<StashEntry, GitError> {
                Ok(StashEntry {
                    index,
                    id: oid_from(entry.id_new())?,
                    message: entry.message().unwrap_or("").to_string(),
                })
            })
            .collect()
    }

    fn default_identity(&self) -> Option<Signature> {
        let repo = self.lock().ok()?;
        let sig = repo.signature().ok()?;
        Some(to_signature(&sig))
    }
}

impl CommitGraph for Git {
    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        // A commit is its own ancestor
        if ancestor == descendant {
            return Ok(true);
        }
        let ancestor_oid = git2_oid(ancestor)?;
        let descendant_oid = git2_oid(descendant)?;
        let repo = self.lock()?;
        Ok(repo.graph_descendant_of(descendant_oid, ancestor_oid)?)
    }

    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        let a = git2_oid(a)?;
        let b = git2_oid(b)?;
        let repo = self.lock()?;
        match repo.merge_base(a, b) {
            Ok(oid) => Ok(Some(oid_from(oid)?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn unmerged_commits(&self, base: Option<&Oid>, tip: &Oid) -> Result<Vec<CommitInfo>, GitError> {
        let ids = {
            let repo = self.lock()?;
            let mut revwalk = repo.revwalk()?;
            revwalk.set_sorting(git2::Sort::TIME)?;
            revwalk.push(git2_oid(tip)?)?;
            if let Some(base) = base {
                revwalk.hide(git2_oid(base)?)?;
            }
            revwalk
                .map(|oid| -> Result<Oid, GitError> { oid_from(oid?) })
                .collect::<Result<Vec<_>, GitError>>()?
        };
        ids.iter().map(|id| self.read_commit(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bare() -> (TempDir, Git) {
        let dir = TempDir::new().unwrap();
        let git = Git::init_bare(dir.path()).unwrap();
        (dir, git)
    }

    fn sig() -> Signature {
        Signature::at("Test", "test@example.com", 1_700_000_000)
    }

    fn commit(git: &Git, files: &[(&str, &str)], parents: Vec<Oid>) -> Oid {
        let entries: Vec<_> = files
            .iter()
            .map(|(name, body)| {
                TreeEntry::new(*name, git.write_blob(body.as_bytes()).unwrap(), FileMode::Regular)
            })
            .collect();
        let tree = git.write_tree(&entries).unwrap();
        git.write_commit(&NewCommit {
            tree,
            parents,
            author: sig(),
            committer: sig(),
            message: "msg\n".to_string(),
        })
        .unwrap()
    }

    mod git_error {
        use super::*;

        #[test]
        fn error_display_formatting() {
            let err = GitError::CasFailed {
                refname: "refs/heads/main".to_string(),
                expected: "abc".to_string(),
                actual: "def".to_string(),
            };
            assert!(err.to_string().contains("CAS failed"));
            assert!(err.to_string().contains("refs/heads/main"));
        }

        #[test]
        fn type_errors_convert() {
            let err: GitError = TypeError::InvalidOid("zz".into()).into();
            assert!(matches!(err, GitError::InvalidOid { .. }));
        }
    }

    mod objects {
        use super::*;

        #[test]
        fn blob_roundtrip_and_dedup() {
            let (_dir, git) = bare();
            let a = git.write_blob(b"hello").unwrap();
            let b = git.write_blob(b"hello").unwrap();
            assert_eq!(a, b);
            assert!(git.has_object(&a).unwrap());
            assert_eq!(git.read_blob(&a).unwrap().bytes(), b"hello");
        }

        #[test]
        fn tree_preserves_modes() {
            let (_dir, git) = bare();
            let blob = git.write_blob(b"#!/bin/sh\n").unwrap();
            let tree = git
                .write_tree(&[TreeEntry::new("run.sh", blob.clone(), FileMode::Executable)])
                .unwrap();
            let snapshot = git.read_tree(&tree).unwrap();
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot.entries()[0].mode, FileMode::Executable);
            assert_eq!(snapshot.entries()[0].id, blob);
        }

        #[test]
        fn missing_blob_is_object_not_found() {
            let (_dir, git) = bare();
            let missing = Oid::new("1".repeat(40)).unwrap();
            assert!(matches!(
                git.read_blob(&missing),
                Err(GitError::ObjectNotFound { .. })
            ));
        }

        #[test]
        fn commit_roundtrip() {
            let (_dir, git) = bare();
            let root = commit(&git, &[("a", "1")], vec![]);
            let child = commit(&git, &[("a", "2")], vec![root.clone()]);
            let info = git.read_commit(&child).unwrap();
            assert_eq!(info.parents, vec![root]);
            assert_eq!(info.summary(), "msg");
            assert_eq!(info.author, sig());
        }
    }

    mod refs {
        use super::*;

        #[test]
        fn cas_create_update_delete() {
            let (_dir, git) = bare();
            let first = commit(&git, &[("a", "1")], vec![]);
            let second = commit(&git, &[("a", "2")], vec![first.clone()]);
            let main = RefName::new("refs/heads/main").unwrap();

            git.update_ref_cas(&main, &first, None, "create").unwrap();
            assert!(matches!(
                git.update_ref_cas(&main, &second, None, "again"),
                Err(GitError::CasFailed { .. })
            ));
            git.update_ref_cas(&main, &second, Some(&first), "advance")
                .unwrap();
            assert_eq!(git.resolve_ref(&main).unwrap(), Some(second.clone()));

            assert!(git.delete_ref_cas(&main, &first).is_err());
            git.delete_ref_cas(&main, &second).unwrap();
            assert_eq!(git.resolve_ref(&main).unwrap(), None);
        }

        #[test]
        fn stash_list_is_newest_first() {
            let (_dir, git) = bare();
            let one = commit(&git, &[("a", "1")], vec![]);
            let two = commit(&git, &[("a", "2")], vec![]);
            git.push_stash(&one, None, "WIP one").unwrap();
            git.push_stash(&two, Some(&one), "WIP two").unwrap();

            let entries = git.stash_entries().unwrap();
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].id, two);
            assert_eq!(entries[0].message, "WIP two");
            assert_eq!(entries[1].id, one);
        }
    }

    mod graph {
        use super::*;

        #[test]
        fn ancestry_and_merge_base() {
            let (_dir, git) = bare();
            let base = commit(&git, &[("a", "1")], vec![]);
            let left = commit(&git, &[("a", "2")], vec![base.clone()]);
            let right = commit(&git, &[("a", "3")], vec![base.clone()]);

            assert!(git.is_ancestor(&base, &left).unwrap());
            assert!(!git.is_ancestor(&left, &right).unwrap());
            assert_eq!(git.merge_base(&left, &right).unwrap(), Some(base.clone()));

            let between = git.unmerged_commits(Some(&base), &left).unwrap();
            assert_eq!(between.len(), 1);
            assert_eq!(between[0].id, left);
        }
    }
}
