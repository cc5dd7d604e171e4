//! gfs::status
//!
//! The status of a file system handle and the lock that serializes commands.
//!
//! # Model
//!
//! A [`GfsStatus`] is an immutable snapshot: which branch is attached, which
//! commit is head, what state the handle is in, and any pending merge note.
//! The [`StatusProvider`] guards the current status with a mutex. A command
//! calls [`StatusProvider::prepare_update`], which blocks until the mutex is
//! free and hands back a [`StatusUpdate`] seeded from the current status.
//! The command holds that update for its whole run, edits the pending copy,
//! and publishes it with [`StatusUpdate::complete`]. Dropping an update
//! without completing it leaves the status untouched; either way the mutex
//! is released.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::core::types::{BranchName, Oid, RefName};

use super::error::GfsError;

/// The state a handle is in.
///
/// `Normal` is the resting state. `MergingConflict` and
/// `CherryPickingConflict` persist between commands until a commit or a
/// hard reset resolves them, as does `Merging` after a merge that was told
/// not to commit. The other states are only ever seen by a running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GfsState {
    Normal,
    CheckingOut,
    Committing,
    Merging,
    MergingConflict,
    CherryPicking,
    CherryPickingConflict,
    Stashing,
    ApplyingStash,
    Resetting,
}

impl GfsState {
    /// Whether unresolved conflicts are pending.
    pub fn is_conflicting(self) -> bool {
        matches!(
            self,
            GfsState::MergingConflict | GfsState::CherryPickingConflict
        )
    }
}

impl std::fmt::Display for GfsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GfsState::Normal => "NORMAL",
            GfsState::CheckingOut => "CHECKING_OUT",
            GfsState::Committing => "COMMITTING",
            GfsState::Merging => "MERGING",
            GfsState::MergingConflict => "MERGING_CONFLICT",
            GfsState::CherryPicking => "CHERRY_PICKING",
            GfsState::CherryPickingConflict => "CHERRY_PICKING_CONFLICT",
            GfsState::Stashing => "STASHING",
            GfsState::ApplyingStash => "APPLYING_STASH",
            GfsState::Resetting => "RESETTING",
        };
        f.write_str(name)
    }
}

/// The second parent and message a merge leaves for the next commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeNote {
    /// The merged commit, or `None` for a squash
    pub source: Option<Oid>,
    pub message: String,
}

impl MergeNote {
    pub fn merge(source: Oid, message: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            message: message.into(),
        }
    }

    pub fn squash(message: impl Into<String>) -> Self {
        Self {
            source: None,
            message: message.into(),
        }
    }
}

/// Immutable snapshot of a handle's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GfsStatus {
    state: GfsState,
    branch: Option<RefName>,
    head: Option<Oid>,
    merge_note: Option<MergeNote>,
}

impl GfsStatus {
    pub fn new(branch: Option<RefName>, head: Option<Oid>) -> Self {
        Self {
            state: GfsState::Normal,
            branch,
            head,
            merge_note: None,
        }
    }

    pub fn state(&self) -> GfsState {
        self.state
    }

    /// The attached branch ref, if any.
    pub fn branch(&self) -> Option<&RefName> {
        self.branch.as_ref()
    }

    /// The attached branch's short name, if any.
    pub fn branch_name(&self) -> Option<BranchName> {
        self.branch.as_ref().and_then(RefName::branch_name)
    }

    pub fn head(&self) -> Option<&Oid> {
        self.head.as_ref()
    }

    pub fn merge_note(&self) -> Option<&MergeNote> {
        self.merge_note.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.branch.is_some()
    }
}

/// Guards the current status.
#[derive(Debug)]
pub struct StatusProvider {
    status: Mutex<GfsStatus>,
}

impl StatusProvider {
    pub fn new(initial: GfsStatus) -> Self {
        Self {
            status: Mutex::new(initial),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, GfsStatus>, GfsError> {
        self.status.lock().map_err(|_| GfsError::poisoned("status"))
    }

    /// A consistent snapshot of the current status.
    pub fn get(&self) -> Result<GfsStatus, GfsError> {
        Ok(self.lock()?.clone())
    }

    /// Take the status lock and start an update toward `target`.
    ///
    /// Blocks while another update is in progress.
    pub fn prepare_update(&self, target: GfsState) -> Result<StatusUpdate<'_>, GfsError> {
        let guard = self.lock()?;
        let mut pending = guard.clone();
        pending.state = target;
        Ok(StatusUpdate { guard, pending })
    }
}

/// An in-progress status change that holds the status lock.
#[must_use = "dropping an update discards it"]
pub struct StatusUpdate<'a> {
    guard: MutexGuard<'a, GfsStatus>,
    pending: GfsStatus,
}

impl StatusUpdate<'_> {
    /// The status as it was when the lock was taken.
    pub fn current(&self) -> &GfsStatus {
        &self.guard
    }

    /// The status that [`StatusUpdate::complete`] will publish.
    pub fn pending(&self) -> &GfsStatus {
        &self.pending
    }

    /// Fail with `BadState` unless the current state is one of `allowed`.
    pub fn require_state(&self, allowed: &[GfsState]) -> Result<(), GfsError> {
        let state = self.guard.state;
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(GfsError::BadState { state })
        }
    }

    /// Drop every pending edit, so completing publishes the current status.
    pub fn revert(&mut self) -> &mut Self {
        self.pending = self.guard.clone();
        self
    }

    pub fn state(&mut self, state: GfsState) -> &mut Self {
        self.pending.state = state;
        self
    }

    pub fn branch(&mut self, branch: Option<RefName>) -> &mut Self {
        self.pending.branch = branch;
        self
    }

    pub fn head(&mut self, head: Option<Oid>) -> &mut Self {
        self.pending.head = head;
        self
    }

    pub fn merge_note(&mut self, note: Option<MergeNote>) -> &mut Self {
        self.pending.merge_note = note;
        self
    }

    /// Publish the pending status and release the lock.
    pub fn complete(mut self) -> GfsStatus {
        *self.guard = self.pending.clone();
        tracing::debug!(state = %self.pending.state, "status updated");
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn provider() -> StatusProvider {
        StatusProvider::new(GfsStatus::new(
            Some(RefName::new("refs/heads/main").unwrap()),
            None,
        ))
    }

    #[test]
    fn complete_publishes() {
        let provider = provider();
        let mut update = provider.prepare_update(GfsState::Merging).unwrap();
        assert_eq!(update.pending().state(), GfsState::Merging);
        assert_eq!(update.current().state(), GfsState::Normal);
        update.merge_note(Some(MergeNote::squash("msg")));
        let published = update.complete();

        let status = provider.get().unwrap();
        assert_eq!(status, published);
        assert_eq!(status.state(), GfsState::Merging);
        assert_eq!(status.merge_note().unwrap().message, "msg");
    }

    #[test]
    fn dropped_update_discards() {
        let provider = provider();
        {
            let mut update = provider.prepare_update(GfsState::Committing).unwrap();
            update.branch(None);
        }
        let status = provider.get().unwrap();
        assert_eq!(status.state(), GfsState::Normal);
        assert!(status.is_attached());
        assert_eq!(status.branch_name().unwrap().as_str(), "main");
    }

    #[test]
    fn require_state_checks_current() {
        let provider = provider();
        let update = provider.prepare_update(GfsState::CheckingOut).unwrap();
        assert!(update.require_state(&[GfsState::Normal]).is_ok());
        assert!(matches!(
            update.require_state(&[GfsState::Merging]),
            Err(GfsError::BadState {
                state: GfsState::Normal
            })
        ));
    }

    #[test]
    fn updates_are_serialized() {
        let provider = Arc::new(provider());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = Arc::clone(&provider);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let mut update = provider.prepare_update(GfsState::Committing).unwrap();
                    let next = update.current().merge_note().map_or(0, |n| {
                        n.message.parse::<u32>().unwrap()
                    }) + 1;
                    update
                        .state(GfsState::Normal)
                        .merge_note(Some(MergeNote::squash(next.to_string())));
                    update.complete();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let status = provider.get().unwrap();
        assert_eq!(status.merge_note().unwrap().message, "400");
    }
}
