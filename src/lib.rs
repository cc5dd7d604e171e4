//! gitvfs - A virtual file system over a git repository
//!
//! A [`gfs::GitFileSystem`] presents one commit's tree as a mutable
//! directory hierarchy held in memory. Files and directories load lazily
//! from the object store, edits stay in memory until a command writes them
//! back, and version-control commands (checkout, merge, commit, reset,
//! stash) run against the handle with compare-and-swap ref updates.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`core`] - Domain types, path algebra, tree snapshots, configuration
//! - [`git`] - Single interface for all repository access (git2 or memory)
//! - [`gfs`] - The file system handle: node cache, status, file operations
//! - [`engine`] - Version-control commands and the three-way merge
//! - [`staging`] - Index-level edits and commits built without a handle
//!
//! # Correctness Invariants
//!
//! 1. Identical content always resolves to the identical object id
//! 2. Every ref update is a compare-and-swap; losing the race is an error
//! 3. One command at a time per handle; status changes are all-or-nothing
//! 4. Conflicts are reported as data, never as errors

pub mod core;
pub mod engine;
pub mod gfs;
pub mod git;
pub mod staging;
