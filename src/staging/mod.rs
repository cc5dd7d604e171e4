//! staging
//!
//! Commit building without a file system handle.
//!
//! [`StagingIndex`] is a flat, path-sorted list of files; [`CacheEditor`]
//! edits it one path at a time and `write_tree` turns it back into nested
//! trees. [`CommitBuilder`] wraps both for bulk imports straight onto a
//! branch.

mod builder;
mod editor;
mod index;

pub use builder::CommitBuilder;
pub use editor::CacheEditor;
pub use index::StagingIndex;
