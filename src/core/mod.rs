//! core
//!
//! Core domain types and pure data structures.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RefName, FileMode, Signature
//! - [`path`] - Path algebra for virtual file system paths
//! - [`snapshot`] - Immutable blob and tree snapshots
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Nothing here touches a repository

pub mod config;
pub mod path;
pub mod snapshot;
pub mod types;
