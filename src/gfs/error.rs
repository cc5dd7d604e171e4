//! gfs::error
//!
//! The error taxonomy every public file system operation reports.
//!
//! Merge and checkout conflicts are **not** errors; they are returned as
//! data inside command outcomes.

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::path::PathError;
use crate::core::types::TypeError;
use crate::git::GitError;

use super::status::GfsState;

/// Errors from file system operations and commands.
#[derive(Debug, Error)]
pub enum GfsError {
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    #[error("file already exists: {path}")]
    AlreadyExists { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("not a regular file: {path}")]
    NotAFile { path: String },

    #[error("directory not empty: {path}")]
    DirectoryNotEmpty { path: String },

    /// The operation needs a branch: either none is attached, or the named
    /// branch does not exist.
    #[error("no branch: {0}")]
    NoBranch(String),

    #[error("no head commit")]
    NoHeadCommit,

    #[error("no such revision: {0}")]
    NoSuchRevision(String),

    #[error("no committer identity: set one explicitly, in config, or in the repository")]
    NoIdentity,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("operation not allowed while the file system is {state}")]
    BadState { state: GfsState },

    #[error("file system is closed")]
    Closed,

    /// A compare-and-swap ref update lost the race. Never retried.
    #[error("ref update rejected for {refname}: expected {expected}, found {actual}")]
    RefUpdateRejected {
        refname: String,
        expected: String,
        actual: String,
    },

    #[error("command already executed")]
    AlreadyExecuted,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Git(GitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl GfsError {
    pub(crate) fn not_found(path: impl std::fmt::Display) -> Self {
        GfsError::NotFound {
            path: path.to_string(),
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        GfsError::Internal(format!("{what} mutex poisoned"))
    }
}

impl From<GitError> for GfsError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::CasFailed {
                refname,
                expected,
                actual,
            } => {
                tracing::warn!(%refname, %expected, %actual, "ref update rejected");
                GfsError::RefUpdateRejected {
                    refname,
                    expected,
                    actual,
                }
            }
            other => GfsError::Git(other),
        }
    }
}

impl From<GfsError> for std::io::Error {
    fn from(err: GfsError) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            GfsError::NotFound { .. } => ErrorKind::NotFound,
            GfsError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            GfsError::InvalidArgument(_) | GfsError::InvalidPath(_) => ErrorKind::InvalidInput,
            GfsError::Io(inner) => inner.kind(),
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_failures_become_rejections() {
        let err: GfsError = GitError::CasFailed {
            refname: "refs/heads/main".into(),
            expected: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert!(matches!(err, GfsError::RefUpdateRejected { .. }));
    }

    #[test]
    fn other_git_errors_are_wrapped() {
        let err: GfsError = GitError::ObjectNotFound { oid: "x".into() }.into();
        assert!(matches!(err, GfsError::Git(GitError::ObjectNotFound { .. })));
    }

    #[test]
    fn io_kinds_follow_the_taxonomy() {
        let io: std::io::Error = GfsError::not_found("/a").into();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
        let io: std::io::Error = GfsError::Closed.into();
        assert_eq!(io.kind(), std::io::ErrorKind::Other);
    }
}
