//! engine::command
//!
//! The lifecycle every version-control command follows.
//!
//! # Architecture
//!
//! Each command is a one-shot builder implementing [`Command`]. Its
//! `execute()` hands it to [`run`], which:
//!
//! 1. Refuses a second execution (`AlreadyExecuted`)
//! 2. Takes the status lock via `prepare_update`
//! 3. Checks the current state against [`Command::ACCEPTED`]
//! 4. Runs the command body with the lock held
//! 5. Publishes the status if the body succeeded
//!
//! An error anywhere drops the pending status, so a failed command leaves
//! the status untouched.
//!
//! # Invariants
//!
//! - Command bodies build every object before touching refs or status
//! - Ref updates are compare-and-swap; a lost race is an error, never retried
//! - Conflicts are returned in the [`Outcome`], not as errors

use std::collections::BTreeMap;
use std::fmt;

use crate::core::snapshot::EntryRef;
use crate::core::types::{Oid, Signature};
use crate::gfs::{GfsError, GfsState, GitFileSystem, StatusUpdate};
use crate::git::Repository;

/// Status values of a command's [`Outcome`].
pub trait CommandStatus: Copy + fmt::Debug + PartialEq {
    /// Whether the command achieved what it was asked to do.
    fn is_successful(self) -> bool;
}

/// One path that could not be resolved automatically.
///
/// Checkout conflicts fill `head`, `target` and `worktree`; merge conflicts
/// fill `base`, `head` (ours) and `target` (theirs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub path: String,
    pub base: Option<EntryRef>,
    pub head: Option<EntryRef>,
    pub target: Option<EntryRef>,
    pub worktree: Option<EntryRef>,
}

impl Conflict {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base: None,
            head: None,
            target: None,
            worktree: None,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn side(entry: &Option<EntryRef>) -> String {
            entry
                .as_ref()
                .map_or_else(|| "-".to_string(), |e| e.id.short(7).to_string())
        }
        write!(
            f,
            "{} (head {}, target {}",
            self.path,
            side(&self.head),
            side(&self.target)
        )?;
        if self.worktree.is_some() {
            write!(f, ", worktree {}", side(&self.worktree))?;
        }
        if self.base.is_some() {
            write!(f, ", base {}", side(&self.base))?;
        }
        f.write_str(")")
    }
}

/// The result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<S> {
    status: S,
    conflicts: BTreeMap<String, Conflict>,
    commit: Option<Oid>,
}

impl<S: CommandStatus> Outcome<S> {
    pub(crate) fn new(status: S) -> Self {
        Self {
            status,
            conflicts: BTreeMap::new(),
            commit: None,
        }
    }

    pub(crate) fn with_commit(mut self, commit: Option<Oid>) -> Self {
        self.commit = commit;
        self
    }

    pub(crate) fn with_conflicts(mut self, conflicts: BTreeMap<String, Conflict>) -> Self {
        self.conflicts = conflicts;
        self
    }

    pub fn status(&self) -> S {
        self.status
    }

    /// Conflicting paths, keyed by path.
    pub fn conflicts(&self) -> &BTreeMap<String, Conflict> {
        &self.conflicts
    }

    /// The commit the command produced or moved to, if any.
    pub fn commit(&self) -> Option<&Oid> {
        self.commit.as_ref()
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }
}

/// Tracks whether a command already ran.
#[derive(Debug)]
pub(crate) struct Invocation {
    gfs: GitFileSystem,
    executed: bool,
}

impl Invocation {
    pub(crate) fn new(gfs: &GitFileSystem) -> Self {
        Self {
            gfs: gfs.clone(),
            executed: false,
        }
    }

    pub(crate) fn file_system(&self) -> &GitFileSystem {
        &self.gfs
    }

    fn claim(&mut self) -> Result<GitFileSystem, GfsError> {
        if self.executed {
            return Err(GfsError::AlreadyExecuted);
        }
        self.executed = true;
        Ok(self.gfs.clone())
    }
}

/// A version-control command run against a file system handle.
pub(crate) trait Command {
    /// Name used in logs.
    const NAME: &'static str;

    /// States the command may start from.
    const ACCEPTED: &'static [GfsState];

    /// State the pending status starts in while the command runs.
    const TRANSIENT: GfsState;

    type Status: CommandStatus;

    fn invocation(&mut self) -> &mut Invocation;

    /// The command body. Runs with the status lock held.
    fn run(
        &mut self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
    ) -> Result<Outcome<Self::Status>, GfsError>;
}

/// Every state; for commands that may start anywhere.
pub(crate) const ANY_STATE: &[GfsState] = &[
    GfsState::Normal,
    GfsState::CheckingOut,
    GfsState::Committing,
    GfsState::Merging,
    GfsState::MergingConflict,
    GfsState::CherryPicking,
    GfsState::CherryPickingConflict,
    GfsState::Stashing,
    GfsState::ApplyingStash,
    GfsState::Resetting,
];

/// Drive `command` through its lifecycle.
pub(crate) fn run<C: Command>(command: &mut C) -> Result<Outcome<C::Status>, GfsError> {
    let gfs = command.invocation().claim()?;
    gfs.ensure_open()?;
    let mut update = gfs.status_provider().prepare_update(C::TRANSIENT)?;
    update.require_state(C::ACCEPTED)?;

    let span = tracing::debug_span!("command", name = C::NAME);
    let _guard = span.enter();
    tracing::debug!(state = %update.current().state(), "command started");

    let outcome = command.run(&gfs, &mut update)?;
    update.complete();

    tracing::debug!(
        status = ?outcome.status(),
        conflicts = outcome.conflicts().len(),
        "command finished"
    );
    Ok(outcome)
}

/// The committer to use when none was given: the configured identity,
/// else the repository's.
pub(crate) fn default_committer(gfs: &GitFileSystem) -> Result<Signature, GfsError> {
    if let Some((name, email)) = gfs.config().identity() {
        return Ok(Signature::now(name, email));
    }
    gfs.repo()
        .default_identity()
        .map(|sig| sig.renewed())
        .ok_or(GfsError::NoIdentity)
}

/// Root tree of `commit`, if there is one.
pub(crate) fn tree_of(repo: &dyn Repository, commit: Option<&Oid>) -> Result<Option<Oid>, GfsError> {
    match commit {
        Some(id) => Ok(Some(repo.read_commit(id)?.tree)),
        None => Ok(None),
    }
}

/// Render a repository path for conflict keys and messages.
pub(crate) fn path_string(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Probe {
        Done,
        Refused,
    }

    impl CommandStatus for Probe {
        fn is_successful(self) -> bool {
            self == Probe::Done
        }
    }

    #[test]
    fn outcome_success_follows_status() {
        assert!(Outcome::new(Probe::Done).is_successful());
        let refused = Outcome::new(Probe::Refused);
        assert!(!refused.is_successful());
        assert!(refused.commit().is_none());
        assert!(refused.conflicts().is_empty());
    }

    #[test]
    fn conflict_display_lists_sides() {
        let mut conflict = Conflict::new("a.txt");
        conflict.head = Some(EntryRef::new(
            Oid::new("a".repeat(40)).unwrap(),
            crate::core::types::FileMode::Regular,
        ));
        assert_eq!(conflict.to_string(), "a.txt (head aaaaaaa, target -)");
    }

    #[test]
    fn any_state_covers_every_state() {
        assert_eq!(ANY_STATE.len(), 10);
    }
}
