//! engine
//!
//! Version-control commands run against a file system handle.
//!
//! # Architecture
//!
//! Every command is a one-shot builder. `execute()` drives it through the
//! shared lifecycle in `command`: claim, state check, run under the
//! status lock, publish. The algorithms underneath are:
//!
//! - `walk`: the head / target / worktree comparison behind checkout and
//!   every change applied to uncommitted edits
//! - `merge_tree`: three-way tree merge
//! - `merge_file`: line-based three-way merge with conflict markers
//!
//! # Invariants
//!
//! - Objects are written before any ref or status changes
//! - Ref updates are compare-and-swap; losing the race fails the command
//! - The status lock is taken before the node tree lock, never after
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use gitvfs::engine::{CommitStatus, MergeStatus};
//! use gitvfs::gfs::GfsBuilder;
//! use gitvfs::git::MemoryRepo;
//!
//! let repo = Arc::new(MemoryRepo::new().with_identity("Jane", "jane@example.com"));
//! let gfs = GfsBuilder::new(repo).open().unwrap();
//! gfs.write(&gfs.path("/a.txt").unwrap(), b"hello\n").unwrap();
//!
//! let outcome = gfs.commit().message("add a.txt").execute().unwrap();
//! assert_eq!(outcome.status(), CommitStatus::Committed);
//!
//! let outcome = gfs.merge("main").execute().unwrap();
//! assert_eq!(outcome.status(), MergeStatus::AlreadyUpToDate);
//! ```

mod checkout;
mod command;
mod commit;
mod merge;
mod merge_file;
mod merge_tree;
mod reset;
mod stash;
mod walk;

#[cfg(test)]
pub(crate) mod testing;

pub use checkout::{Checkout, CheckoutStatus};
pub use command::{CommandStatus, Conflict, Outcome};
pub use commit::{Commit, CommitStatus};
pub use merge::{Merge, MergeStatus};
pub use reset::{Reset, ResetStatus};
pub use stash::{ApplyStash, ApplyStashStatus, CreateStash, StashStatus};

use crate::gfs::GitFileSystem;

impl GitFileSystem {
    /// Start a checkout of a branch or revision.
    pub fn checkout(&self, target: impl Into<String>) -> Checkout {
        Checkout::new(self, target)
    }

    /// Start a merge of a branch or revision into the attached branch.
    pub fn merge(&self, source: impl Into<String>) -> Merge {
        Merge::new(self, source)
    }

    pub fn commit(&self) -> Commit {
        Commit::new(self)
    }

    pub fn reset(&self) -> Reset {
        Reset::new(self)
    }

    pub fn stash(&self) -> CreateStash {
        CreateStash::new(self)
    }

    pub fn stash_apply(&self) -> ApplyStash {
        ApplyStash::new(self)
    }
}
