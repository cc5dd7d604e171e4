//! engine::reset
//!
//! Move the head (and the attached branch) to another commit.

use crate::gfs::{GfsError, GfsState, GitFileSystem, StatusUpdate};
use crate::git::revision;

use super::command::{self, Command, CommandStatus, Invocation, Outcome, ANY_STATE};

/// Result of a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStatus {
    Ok,
}

impl CommandStatus for ResetStatus {
    fn is_successful(self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Head only
    Soft,
    /// Head and working tree
    Mixed,
    /// Head, working tree, and any merge in progress
    Hard,
}

/// Reset the head to a revision, by default the current head.
///
/// The default mode replaces the working tree with the target's tree.
/// [`Reset::soft`] moves only the head; [`Reset::hard`] also abandons a
/// merge in progress and returns the handle to `NORMAL`.
#[derive(Debug)]
pub struct Reset {
    invocation: Invocation,
    revision: Option<String>,
    mode: Mode,
}

impl Reset {
    pub fn new(gfs: &GitFileSystem) -> Self {
        Self {
            invocation: Invocation::new(gfs),
            revision: None,
            mode: Mode::Mixed,
        }
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn soft(mut self) -> Self {
        self.mode = Mode::Soft;
        self
    }

    pub fn hard(mut self) -> Self {
        self.mode = Mode::Hard;
        self
    }

    pub fn execute(&mut self) -> Result<Outcome<ResetStatus>, GfsError> {
        command::run(self)
    }
}

impl Command for Reset {
    const NAME: &'static str = "reset";
    const ACCEPTED: &'static [GfsState] = ANY_STATE;
    const TRANSIENT: GfsState = GfsState::Resetting;
    type Status = ResetStatus;

    fn invocation(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn run(
        &mut self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
    ) -> Result<Outcome<ResetStatus>, GfsError> {
        let repo = gfs.repo();
        let current = update.current().clone();
        let target = match &self.revision {
            Some(rev) => {
                revision::resolve(repo, rev)?
                    .ok_or_else(|| GfsError::NoSuchRevision(rev.clone()))?
                    .commit
            }
            None => current.head().cloned().ok_or(GfsError::NoHeadCommit)?,
        };
        let tree = repo.read_commit(&target)?.tree;

        let mut worktree = gfs.lock_tree()?;
        if let Some(branch) = current.branch() {
            if current.head() != Some(&target) {
                let message = format!(
                    "reset: moving to {}",
                    self.revision.as_deref().unwrap_or("HEAD")
                );
                repo.update_ref_cas(branch, &target, current.head(), &message)?;
            }
        }
        if self.mode != Mode::Soft {
            worktree.update_origin(tree);
        }

        tracing::debug!(target = %target.short(7), mode = ?self.mode, "reset");
        update.head(Some(target.clone()));
        if self.mode == Mode::Hard {
            update.merge_note(None).state(GfsState::Normal);
        } else {
            update.state(current.state());
        }
        Ok(Outcome::new(ResetStatus::Ok).with_commit(Some(target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{read, write, Fixture};

    fn history() -> (Fixture, crate::core::types::Oid) {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a", "1")]);
        fx.commit("main", &[&base], &[("a", "2")]);
        (fx, base)
    }

    #[test]
    fn mixed_reset_discards_edits() {
        let (fx, _) = history();
        let gfs = fx.open("main");
        write(&gfs, "/a", "dirty");
        let outcome = gfs.reset().execute().unwrap();
        assert!(outcome.is_successful());
        assert_eq!(read(&gfs, "/a"), "2");
        assert!(!gfs.has_pending_changes().unwrap());
    }

    #[test]
    fn soft_reset_moves_only_the_head() {
        let (fx, base) = history();
        let gfs = fx.open("main");
        gfs.reset().revision(base.as_str()).soft().execute().unwrap();
        assert_eq!(fx.tip("main"), Some(base.clone()));
        assert_eq!(gfs.status().unwrap().head(), Some(&base));
        assert_eq!(read(&gfs, "/a"), "2");
    }

    #[test]
    fn hard_reset_abandons_a_merge() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a.txt", "1")]);
        let x = fx.commit("X", &[&base], &[("a.txt", "2")]);
        fx.commit("Y", &[&base], &[("a.txt", "3")]);
        let gfs = fx.open("X");
        gfs.merge("Y").execute().unwrap();
        assert_eq!(gfs.status().unwrap().state(), GfsState::MergingConflict);

        gfs.reset().hard().execute().unwrap();
        let status = gfs.status().unwrap();
        assert_eq!(status.state(), GfsState::Normal);
        assert!(status.merge_note().is_none());
        assert_eq!(status.head(), Some(&x));
        assert_eq!(read(&gfs, "/a.txt"), "2");
    }

    #[test]
    fn mixed_reset_keeps_the_state() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a.txt", "1")]);
        fx.commit("X", &[&base], &[("a.txt", "2")]);
        fx.commit("Y", &[&base], &[("a.txt", "3")]);
        let gfs = fx.open("X");
        gfs.merge("Y").execute().unwrap();
        gfs.reset().execute().unwrap();
        assert_eq!(gfs.status().unwrap().state(), GfsState::MergingConflict);
    }

    #[test]
    fn reset_without_head_fails() {
        let fx = Fixture::new();
        let gfs = fx.open("main");
        assert!(matches!(
            gfs.reset().execute(),
            Err(GfsError::NoHeadCommit)
        ));
        assert!(matches!(
            gfs.reset().revision("missing").execute(),
            Err(GfsError::NoSuchRevision(_))
        ));
    }
}
