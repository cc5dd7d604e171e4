//! git::store
//!
//! The narrow interfaces the virtual file system consumes from a repository.
//!
//! # Traits
//!
//! - [`ObjectStore`] - content-addressed blobs, trees and commits
//! - [`RefStore`] - refs with compare-and-swap updates, plus the stash list
//! - [`CommitGraph`] - ancestry queries over commits
//! - [`Repository`] - all three together, what a file system is opened on
//!
//! Writing identical content twice must yield the same id without storing a
//! second copy. Every ref mutation is a compare-and-swap against the value
//! the caller last observed.

use std::collections::{HashSet, VecDeque};

use crate::core::snapshot::{BlobSnapshot, TreeEntry, TreeSnapshot};
use crate::core::types::{BranchName, Oid, RefName, Signature};

use super::GitError;

/// A parsed commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// The commit id
    pub id: Oid,
    /// Root tree of the commit
    pub tree: Oid,
    /// Parent commits, first parent first
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    /// Full commit message
    pub message: String,
}

impl CommitInfo {
    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A commit about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

/// A ref with its name and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// The full ref name
    pub name: RefName,
    /// The object the ref points to
    pub id: Oid,
}

/// One entry of the stash list. Index 0 is the most recent stash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    pub index: usize,
    pub id: Oid,
    pub message: String,
}

/// Content-addressed object storage.
pub trait ObjectStore: Send + Sync {
    fn has_object(&self, id: &Oid) -> Result<bool, GitError>;

    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if no blob has this id
    fn read_blob(&self, id: &Oid) -> Result<BlobSnapshot, GitError>;

    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if no tree has this id
    fn read_tree(&self, id: &Oid) -> Result<TreeSnapshot, GitError>;

    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if no commit has this id
    fn read_commit(&self, id: &Oid) -> Result<CommitInfo, GitError>;

    fn write_blob(&self, bytes: &[u8]) -> Result<Oid, GitError>;

    /// Write a tree. Entries may come in any order; the store sorts them.
    fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid, GitError>;

    fn write_commit(&self, commit: &NewCommit) -> Result<Oid, GitError>;

    /// Id of the tree with no entries, writing it if needed.
    fn empty_tree(&self) -> Result<Oid, GitError> {
        self.write_tree(&[])
    }

    /// Make every write so far durable.
    fn flush(&self) -> Result<(), GitError>;

    /// Release resources. Further use is a caller error.
    fn close(&self) -> Result<(), GitError> {
        Ok(())
    }
}

/// Reference storage.
pub trait RefStore: Send + Sync {
    /// Resolve a ref to the commit it names, or `None` if absent.
    fn resolve_ref(&self, name: &RefName) -> Result<Option<Oid>, GitError>;

    /// Move `name` to `new_id`, but only if it currently holds `expected_old`.
    ///
    /// `expected_old == None` means the ref must not exist yet.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value differs
    fn update_ref_cas(
        &self,
        name: &RefName,
        new_id: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError>;

    /// Delete `name` if it currently holds `expected_old`.
    fn delete_ref_cas(&self, name: &RefName, expected_old: &Oid) -> Result<(), GitError>;

    /// All refs whose names start with `prefix`.
    fn list_refs(&self, prefix: &str) -> Result<Vec<RefEntry>, GitError>;

    /// The branch `HEAD` points at, even if that branch has no commits yet.
    fn head_branch(&self) -> Result<Option<BranchName>, GitError>;

    /// Push a stash commit, compare-and-swapping `refs/stash` from
    /// `expected_old`.
    fn push_stash(
        &self,
        id: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError>;

    /// The stash list, most recent first.
    fn stash_entries(&self) -> Result<Vec<StashEntry>, GitError>;

    /// Identity the repository itself is configured with, if any.
    fn default_identity(&self) -> Option<Signature>;
}

/// Ancestry queries.
///
/// The provided implementations walk parents through
/// [`ObjectStore::read_commit`]; backends with a native graph override them.
pub trait CommitGraph: ObjectStore {
    /// Whether `ancestor` is reachable from `descendant`. A commit is its own
    /// ancestor.
    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([descendant.clone()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for parent in self.read_commit(&id)?.parents {
                if &parent == ancestor {
                    return Ok(true);
                }
                queue.push_back(parent);
            }
        }
        Ok(false)
    }

    /// Nearest common ancestor of `a` and `b`, if they share history.
    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
        let ancestors_of_a = ancestors(self, a)?;
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([b.clone()]);
        while let Some(id) = queue.pop_front() {
            if ancestors_of_a.contains(&id) {
                return Ok(Some(id));
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            queue.extend(self.read_commit(&id)?.parents);
        }
        Ok(None)
    }

    /// Commits reachable from `tip` but not from `base`, newest first.
    fn unmerged_commits(&self, base: Option<&Oid>, tip: &Oid) -> Result<Vec<CommitInfo>, GitError> {
        let hidden = match base {
            Some(base) => ancestors(self, base)?,
            None => HashSet::new(),
        };
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([tip.clone()]);
        let mut commits = Vec::new();
        while let Some(id) = queue.pop_front() {
            if hidden.contains(&id) || !seen.insert(id.clone()) {
                continue;
            }
            let commit = self.read_commit(&id)?;
            queue.extend(commit.parents.iter().cloned());
            commits.push(commit);
        }
        commits.sort_by(|a, b| b.committer.when.cmp(&a.committer.when));
        Ok(commits)
    }
}

/// Every commit reachable from `tip`, including `tip`.
fn ancestors<G: CommitGraph + ?Sized>(graph: &G, tip: &Oid) -> Result<HashSet<Oid>, GitError> {
    let mut seen = HashSet::new();
    let mut stack = vec![tip.clone()];
    while let Some(id) = stack.pop() {
        if seen.insert(id.clone()) {
            stack.extend(graph.read_commit(&id)?.parents);
        }
    }
    Ok(seen)
}

/// A repository a file system can be opened on.
pub trait Repository: ObjectStore + RefStore + CommitGraph {}

impl<T: ObjectStore + RefStore + CommitGraph> Repository for T {}
