//! git
//!
//! Repository access for the virtual file system.
//!
//! # Architecture
//!
//! Everything above this module sees a repository only through the
//! [`Repository`] traits: an object store, a ref store with compare-and-swap
//! updates, and a commit graph. Two backends implement them:
//!
//! - [`Git`]: a real repository on disk, through git2. This is the **only**
//!   module that imports `git2`.
//! - [`MemoryRepo`]: a self-contained in-memory repository.
//!
//! # Invariants
//!
//! - All ref updates use CAS (compare-and-swap) semantics
//! - Identical content always yields the identical object id
//! - All operations return strong types (Oid, BranchName, RefName)
//!
//! # Example
//!
//! ```
//! use gitvfs::git::{MemoryRepo, ObjectStore, RefStore};
//! use gitvfs::core::types::RefName;
//!
//! let repo = MemoryRepo::new();
//! let blob = repo.write_blob(b"hello\n").unwrap();
//! assert!(repo.has_object(&blob).unwrap());
//! assert!(repo.resolve_ref(&RefName::new("refs/heads/main").unwrap()).unwrap().is_none());
//! ```

mod interface;
mod memory;
pub mod revision;
mod store;

pub use interface::{Git, GitError};
pub use memory::MemoryRepo;
pub use store::{
    CommitGraph, CommitInfo, NewCommit, ObjectStore, RefEntry, RefStore, Repository, StashEntry,
};
