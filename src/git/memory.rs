//! git::memory
//!
//! A repository that lives entirely in memory.
//!
//! Objects are framed the way git frames them (`<kind> <len>\0<body>`) and
//! addressed by the SHA-256 of that framing, so identical content always
//! lands on the same 64-hex id and is stored once. Refs, `HEAD` and the
//! stash list are plain maps behind one mutex.
//!
//! Useful for tests and for callers that want throwaway repositories.
//!
//! # Example
//!
//! ```
//! use gitvfs::git::{MemoryRepo, ObjectStore};
//!
//! let repo = MemoryRepo::new();
//! let a = repo.write_blob(b"hello").unwrap();
//! let b = repo.write_blob(b"hello").unwrap();
//! assert_eq!(a, b);
//! assert_eq!(repo.object_count(), 1);
//! assert_eq!(repo.write_count(), 2);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use crate::core::snapshot::{sort_entries, BlobSnapshot, TreeEntry, TreeSnapshot};
use crate::core::types::{BranchName, Oid, RefName, Signature};

use super::store::{CommitGraph, CommitInfo, NewCommit, ObjectStore, RefEntry, RefStore, StashEntry};
use super::GitError;

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(Vec<TreeEntry>),
    Commit(NewCommit),
}

impl Object {
    fn kind(&self) -> &'static str {
        match self {
            Object::Blob(_) => "blob",
            Object::Tree(_) => "tree",
            Object::Commit(_) => "commit",
        }
    }

    /// The object body in git's canonical encoding.
    fn body(&self) -> Vec<u8> {
        match self {
            Object::Blob(bytes) => bytes.clone(),
            Object::Tree(entries) => {
                let mut body = Vec::new();
                for entry in entries {
                    body.extend_from_slice(format!("{:o} ", entry.mode.to_value()).as_bytes());
                    body.extend_from_slice(&entry.name);
                    body.push(0);
                    body.extend_from_slice(&entry.id.to_raw());
                }
                body
            }
            Object::Commit(commit) => {
                let mut text = format!("tree {}\n", commit.tree);
                for parent in &commit.parents {
                    text.push_str(&format!("parent {}\n", parent));
                }
                for (role, sig) in [("author", &commit.author), ("committer", &commit.committer)] {
                    text.push_str(&format!(
                        "{} {} <{}> {} +0000\n",
                        role,
                        sig.name,
                        sig.email,
                        sig.when.timestamp()
                    ));
                }
                text.push('\n');
                text.push_str(&commit.message);
                text.into_bytes()
            }
        }
    }

    fn id(&self) -> Result<Oid, GitError> {
        let body = self.body();
        let mut hasher = Sha256::new();
        hasher.update(format!("{} {}\0", self.kind(), body.len()).as_bytes());
        hasher.update(&body);
        Ok(Oid::from_raw(&hasher.finalize())?)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<Oid, Object>,
    refs: BTreeMap<RefName, Oid>,
    head: Option<BranchName>,
    /// Most recent first.
    stash: Vec<(Oid, String)>,
    identity: Option<(String, String)>,
}

/// An in-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    state: Mutex<MemoryState>,
    writes: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryRepo {
    /// An empty repository whose `HEAD` points at the unborn `main` branch.
    pub fn new() -> Self {
        let repo = Self::default();
        if let Ok(mut state) = repo.state.lock() {
            state.head = BranchName::new("main").ok();
        }
        repo
    }

    /// Set the identity the repository reports as its default.
    pub fn with_identity(self, name: impl Into<String>, email: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.identity = Some((name.into(), email.into()));
        }
        self
    }

    /// Point `HEAD` at `branch`.
    pub fn set_head(&self, branch: &BranchName) -> Result<(), GitError> {
        self.lock()?.head = Some(branch.clone());
        Ok(())
    }

    /// Number of distinct objects stored.
    pub fn object_count(&self) -> usize {
        self.lock().map(|s| s.objects.len()).unwrap_or(0)
    }

    /// Number of write calls served, including ones that deduplicated.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of times a file system released this repository.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, GitError> {
        self.state.lock().map_err(|_| GitError::Internal {
            message: "memory repository mutex poisoned".to_string(),
        })
    }

    fn insert(&self, object: Object) -> Result<Oid, GitError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let id = object.id()?;
        tracing::trace!(kind = object.kind(), id = %id.short(12), "wrote object");
        self.lock()?.objects.entry(id.clone()).or_insert(object);
        Ok(id)
    }

    fn get(&self, id: &Oid) -> Result<Object, GitError> {
        self.lock()?
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| GitError::ObjectNotFound { oid: id.to_string() })
    }

    fn cas(
        state: &mut MemoryState,
        name: &RefName,
        new_id: &Oid,
        expected_old: Option<&Oid>,
    ) -> Result<(), GitError> {
        let current = state.refs.get(name);
        if current != expected_old {
            return Err(GitError::CasFailed {
                refname: name.to_string(),
                expected: expected_old.map_or_else(|| "<none>".to_string(), Oid::to_string),
                actual: current.map_or_else(|| "<none>".to_string(), Oid::to_string),
            });
        }
        state.refs.insert(name.clone(), new_id.clone());
        Ok(())
    }
}

impl ObjectStore for MemoryRepo {
    fn has_object(&self, id: &Oid) -> Result<bool, GitError> {
        Ok(self.lock()?.objects.contains_key(id))
    }

    fn read_blob(&self, id: &Oid) -> Result<BlobSnapshot, GitError> {
        match self.get(id)? {
            Object::Blob(bytes) => Ok(BlobSnapshot::new(id.clone(), bytes)),
            _ => Err(GitError::WrongObjectType {
                oid: id.to_string(),
                expected: "blob",
            }),
        }
    }

    fn read_tree(&self, id: &Oid) -> Result<TreeSnapshot, GitError> {
        match self.get(id)? {
            Object::Tree(entries) => Ok(TreeSnapshot::new(id.clone(), entries)),
            _ => Err(GitError::WrongObjectType {
                oid: id.to_string(),
                expected: "tree",
            }),
        }
    }

    fn read_commit(&self, id: &Oid) -> Result<CommitInfo, GitError> {
        match self.get(id)? {
            Object::Commit(commit) => Ok(CommitInfo {
                id: id.clone(),
                tree: commit.tree,
                parents: commit.parents,
                author: commit.author,
                committer: commit.committer,
                message: commit.message,
            }),
            _ => Err(GitError::WrongObjectType {
                oid: id.to_string(),
                expected: "commit",
            }),
        }
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<Oid, GitError> {
        self.insert(Object::Blob(bytes.to_vec()))
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid, GitError> {
        let mut entries = entries.to_vec();
        sort_entries(&mut entries);
        if let Some(pair) = entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(GitError::Corrupt {
                oid: String::new(),
                message: format!("duplicate tree entry '{}'", pair[0].display_name()),
            });
        }
        self.insert(Object::Tree(entries))
    }

    fn write_commit(&self, commit: &NewCommit) -> Result<Oid, GitError> {
        self.insert(Object::Commit(commit.clone()))
    }

    fn flush(&self) -> Result<(), GitError> {
        Ok(())
    }

    fn close(&self) -> Result<(), GitError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl RefStore for MemoryRepo {
    fn resolve_ref(&self, name: &RefName) -> Result<Option<Oid>, GitError> {
        Ok(self.lock()?.refs.get(name).cloned())
    }

    fn update_ref_cas(
        &self,
        name: &RefName,
        new_id: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let mut state = self.lock()?;
        Self::cas(&mut state, name, new_id, expected_old)?;
        drop(state);
        tracing::info!(refname = %name, to = %new_id.short(7), reason = message, "updated ref");
        Ok(())
    }

    fn delete_ref_cas(&self, name: &RefName, expected_old: &Oid) -> Result<(), GitError> {
        let mut state = self.lock()?;
        match state.refs.get(name).cloned() {
            None => Err(GitError::RefNotFound {
                refname: name.to_string(),
            }),
            Some(actual) if &actual != expected_old => Err(GitError::CasFailed {
                refname: name.to_string(),
                expected: expected_old.to_string(),
                actual: actual.to_string(),
            }),
            Some(_) => {
                state.refs.remove(name);
                Ok(())
            }
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<RefEntry>, GitError> {
        Ok(self
            .lock()?
            .refs
            .iter()
            .filter(|(name, _)| name.as_str().starts_with(prefix))
            .map(|(name, id)| RefEntry {
                name: name.clone(),
                id: id.clone(),
            })
            .collect())
    }

    fn head_branch(&self) -> Result<Option<BranchName>, GitError> {
        Ok(self.lock()?.head.clone())
    }

    fn push_stash(
        &self,
        id: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let mut state = self.lock()?;
        Self::cas(&mut state, &RefName::stash(), id, expected_old)?;
        state.stash.insert(0, (id.clone(), message.to_string()));
        Ok(())
    }

    fn stash_entries(&self) -> Result<Vec<StashEntry>, GitError> {
        Ok(self
            .lock()?
            .stash
            .iter()
            .enumerate()
            .map(|(index, (id, message))| StashEntry {
                index,
                id: id.clone(),
                message: message.clone(),
            })
            .collect())
    }

    fn default_identity(&self) -> Option<Signature> {
        let state = self.lock().ok()?;
        let (name, email) = state.identity.as_ref()?;
        Some(Signature::now(name.clone(), email.clone()))
    }
}

impl CommitGraph for MemoryRepo {}
