//! gfs
//!
//! The virtual file system handle.
//!
//! # Architecture
//!
//! A [`GitFileSystem`] owns three things: a repository, a status guarded by
//! the [`StatusProvider`], and a node tree guarded by its own mutex. File
//! operations lock only the node tree. Commands (see [`crate::engine`])
//! hold the status lock for their whole run and take the node tree lock
//! inside it, so the lock order is always status, then tree.
//!
//! Handles are cheap to clone; clones share the same session.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gitvfs::gfs::GfsBuilder;
//! use gitvfs::git::MemoryRepo;
//!
//! let gfs = GfsBuilder::new(Arc::new(MemoryRepo::new())).open().unwrap();
//! let path = gfs.path("/notes/todo.txt").unwrap();
//! gfs.create_directories(&path.parent().unwrap()).unwrap();
//! gfs.write(&path, b"buy milk\n").unwrap();
//! assert_eq!(gfs.read(&path).unwrap(), b"buy milk\n");
//! ```

mod builder;
mod channel;
mod error;
mod files;
pub(crate) mod node;
pub mod registry;
mod status;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::core::config::Config;
use crate::core::path::{GfsPath, PathError};
use crate::core::types::Oid;
use crate::git::Repository;

pub use builder::GfsBuilder;
pub use channel::{FileChannel, OpenOptions};
pub use error::GfsError;
pub use files::{Metadata, NodeKind};
pub use status::{GfsState, GfsStatus, MergeNote, StatusProvider, StatusUpdate};

use node::NodeTree;

pub(crate) struct Inner {
    session: Uuid,
    repo: Arc<dyn Repository>,
    config: Config,
    status: StatusProvider,
    tree: Mutex<NodeTree>,
    closed: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        registry::unregister(self.session);
    }
}

/// A mutable, in-memory view of one tree in a repository.
#[derive(Clone)]
pub struct GitFileSystem {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GitFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitFileSystem")
            .field("session", &self.inner.session)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl GitFileSystem {
    pub(crate) fn assemble(
        repo: Arc<dyn Repository>,
        config: Config,
        status: GfsStatus,
        tree: NodeTree,
    ) -> Self {
        let inner = Arc::new(Inner {
            session: Uuid::new_v4(),
            repo,
            config,
            status: StatusProvider::new(status),
            tree: Mutex::new(tree),
            closed: AtomicBool::new(false),
        });
        registry::register(inner.session, Arc::downgrade(&inner));
        tracing::debug!(session = %inner.session, "file system opened");
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// The session id that scopes this handle's paths.
    pub fn session(&self) -> Uuid {
        self.inner.session
    }

    /// The repository behind this handle.
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.inner.repo
    }

    pub(crate) fn repo(&self) -> &dyn Repository {
        &*self.inner.repo
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), GfsError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(GfsError::Closed)
        }
    }

    /// Close the handle. Every later operation fails with `Closed`.
    ///
    /// Unsaved edits in the node cache are dropped and the store is
    /// released. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), GfsError> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            registry::unregister(self.inner.session);
            *self.lock_tree()? = NodeTree::empty();
            self.repo().close()?;
            tracing::debug!(session = %self.inner.session, "file system closed");
        }
        Ok(())
    }

    /// A consistent snapshot of the current status.
    pub fn status(&self) -> Result<GfsStatus, GfsError> {
        self.ensure_open()?;
        self.inner.status.get()
    }

    pub(crate) fn status_provider(&self) -> &StatusProvider {
        &self.inner.status
    }

    pub(crate) fn lock_tree(&self) -> Result<MutexGuard<'_, NodeTree>, GfsError> {
        self.inner
            .tree
            .lock()
            .map_err(|_| GfsError::poisoned("node tree"))
    }

    /// Parse a path in this handle's session.
    pub fn path(&self, text: &str) -> Result<GfsPath, GfsError> {
        self.ensure_open()?;
        Ok(GfsPath::new(self.inner.session, text)?)
    }

    /// The root directory `/`.
    pub fn root(&self) -> GfsPath {
        GfsPath::root_of(self.inner.session)
    }

    /// Absolute, normalized form of a path owned by this handle.
    pub(crate) fn locate(&self, path: &GfsPath) -> Result<GfsPath, GfsError> {
        if path.session() != self.inner.session {
            return Err(PathError::ForeignPath {
                path: path.to_string(),
            }
            .into());
        }
        Ok(path.to_absolute().normalize())
    }

    /// The tree id the working tree currently amounts to.
    ///
    /// Dirty content is written to the object store, but the working tree
    /// stays dirty.
    pub fn worktree_id(&self) -> Result<Oid, GfsError> {
        self.ensure_open()?;
        let mut tree = self.lock_tree()?;
        tree.root_id(self.repo(), false)
    }

    /// Write every dirty node back to the object store and return the root
    /// tree id. Afterwards the working tree is clean.
    pub fn flush(&self) -> Result<Oid, GfsError> {
        self.ensure_open()?;
        let id = {
            let mut tree = self.lock_tree()?;
            tree.root_id(self.repo(), true)?
        };
        self.repo().flush()?;
        Ok(id)
    }

    /// Whether anything was edited since the last write-back.
    pub fn has_pending_changes(&self) -> Result<bool, GfsError> {
        self.ensure_open()?;
        Ok(self.lock_tree()?.is_dirty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MemoryRepo;

    fn open() -> GitFileSystem {
        GfsBuilder::new(Arc::new(MemoryRepo::new())).open().unwrap()
    }

    #[test]
    fn closed_handles_reject_everything() {
        let gfs = open();
        let path = gfs.path("/a").unwrap();
        gfs.close().unwrap();
        gfs.close().unwrap();
        assert!(!gfs.is_open());
        assert!(matches!(gfs.path("/b"), Err(GfsError::Closed)));
        assert!(matches!(gfs.read(&path), Err(GfsError::Closed)));
        assert!(matches!(gfs.status(), Err(GfsError::Closed)));
    }

    #[test]
    fn close_releases_the_store_and_the_cache() {
        let repo = Arc::new(MemoryRepo::new());
        let gfs = GfsBuilder::new(repo.clone()).open().unwrap();
        gfs.write(&gfs.path("/f").unwrap(), b"x").unwrap();
        assert!(gfs.lock_tree().unwrap().is_dirty());

        gfs.close().unwrap();
        gfs.close().unwrap();
        assert_eq!(repo.close_count(), 1);
        assert!(!gfs.lock_tree().unwrap().is_dirty());
    }

    #[test]
    fn foreign_paths_are_rejected() {
        let a = open();
        let b = open();
        let foreign = b.path("/x").unwrap();
        assert!(matches!(
            a.exists(&foreign),
            Err(GfsError::InvalidPath(PathError::ForeignPath { .. }))
        ));
    }

    #[test]
    fn flush_cleans_the_tree() {
        let gfs = open();
        let path = gfs.path("/f").unwrap();
        gfs.write(&path, b"x").unwrap();
        assert!(gfs.has_pending_changes().unwrap());
        let pending = gfs.worktree_id().unwrap();
        assert!(gfs.has_pending_changes().unwrap());
        assert_eq!(gfs.flush().unwrap(), pending);
        assert!(!gfs.has_pending_changes().unwrap());
    }
}
