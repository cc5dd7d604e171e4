//! engine::commit
//!
//! Record the working tree (or a given tree) as a new commit on the head.

use crate::core::types::{Oid, Signature};
use crate::gfs::{GfsError, GfsState, GitFileSystem, StatusUpdate};
use crate::git::NewCommit;

use super::command::{self, default_committer, Command, CommandStatus, Invocation, Outcome};

/// Result of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// The tree matched the parent's and empty commits were not allowed
    NoChange,
}

impl CommandStatus for CommitStatus {
    fn is_successful(self) -> bool {
        self == CommitStatus::Committed
    }
}

/// Commit the working tree.
///
/// A pending merge note supplies the second parent and the default
/// message, and is cleared by the commit.
#[derive(Debug)]
pub struct Commit {
    invocation: Invocation,
    message: Option<String>,
    author: Option<Signature>,
    committer: Option<Signature>,
    amend: bool,
    allow_empty: bool,
    tree: Option<Oid>,
}

impl Commit {
    pub fn new(gfs: &GitFileSystem) -> Self {
        Self {
            invocation: Invocation::new(gfs),
            message: None,
            author: None,
            committer: None,
            amend: false,
            allow_empty: false,
            tree: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Replace the head commit instead of adding on top of it.
    pub fn amend(mut self, amend: bool) -> Self {
        self.amend = amend;
        self
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// Commit this tree instead of the working tree.
    pub fn tree(mut self, tree: Oid) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn execute(&mut self) -> Result<Outcome<CommitStatus>, GfsError> {
        command::run(self)
    }
}

impl Command for Commit {
    const NAME: &'static str = "commit";
    const ACCEPTED: &'static [GfsState] = &[
        GfsState::Normal,
        GfsState::Merging,
        GfsState::MergingConflict,
        GfsState::CherryPicking,
        GfsState::CherryPickingConflict,
    ];
    const TRANSIENT: GfsState = GfsState::Committing;
    type Status = CommitStatus;

    fn invocation(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn run(
        &mut self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
    ) -> Result<Outcome<CommitStatus>, GfsError> {
        let repo = gfs.repo();
        let current = update.current().clone();
        let head = current.head().cloned();
        let head_info = head.as_ref().map(|id| repo.read_commit(id)).transpose()?;
        let note = current.merge_note().cloned();

        let mut parents = match (&head_info, self.amend) {
            (Some(info), true) => info.parents.clone(),
            (None, true) => return Err(GfsError::NoHeadCommit),
            (_, false) => head.iter().cloned().collect(),
        };
        if let Some(source) = note.as_ref().and_then(|n| n.source.clone()) {
            parents.push(source);
        }

        // Held until the cache is rebound, so no edit slips in between.
        let mut worktree = gfs.lock_tree()?;
        let (tree, from_cache) = match &self.tree {
            Some(tree) => (tree.clone(), false),
            None => (worktree.root_id(repo, false)?, true),
        };

        if !self.amend && !self.allow_empty && parents.len() == 1 {
            let parent_tree = repo.read_commit(&parents[0])?.tree;
            if parent_tree == tree {
                tracing::debug!("nothing to commit");
                update.revert();
                return Ok(Outcome::new(CommitStatus::NoChange).with_commit(head));
            }
        }

        let message = match (&self.message, &note, &head_info) {
            (Some(message), _, _) => message.clone(),
            (None, Some(note), _) => note.message.clone(),
            (None, None, Some(info)) if self.amend => info.message.clone(),
            _ => {
                return Err(GfsError::InvalidArgument(
                    "a commit message is required".to_string(),
                ))
            }
        };
        let committer = match &self.committer {
            Some(committer) => committer.clone(),
            None => default_committer(gfs)?,
        };
        let author = match (&self.author, &head_info) {
            (Some(author), _) => author.clone(),
            (None, Some(info)) if self.amend => info.author.clone(),
            _ => committer.clone(),
        };

        let reflog_kind = if self.amend {
            "commit (amend)"
        } else if parents.len() > 1 {
            "commit (merge)"
        } else if parents.is_empty() {
            "commit (initial)"
        } else {
            "commit"
        };
        let reflog = format!("{reflog_kind}: {}", message.lines().next().unwrap_or(""));

        let commit = repo.write_commit(&NewCommit {
            tree: tree.clone(),
            parents,
            author,
            committer,
            message: if message.ends_with('\n') {
                message
            } else {
                format!("{message}\n")
            },
        })?;
        repo.flush()?;

        if let Some(branch) = current.branch() {
            repo.update_ref_cas(branch, &commit, head.as_ref(), &reflog)?;
        }
        if from_cache {
            worktree.update_origin(tree);
        }

        tracing::debug!(commit = %commit.short(7), kind = reflog_kind, "committed");
        update
            .head(Some(commit.clone()))
            .merge_note(None)
            .state(GfsState::Normal);
        Ok(Outcome::new(CommitStatus::Committed).with_commit(Some(commit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{read, write, Fixture};
    use crate::git::{ObjectStore, RefStore};

    #[test]
    fn initial_commit_creates_the_branch() {
        let fx = Fixture::new();
        let gfs = fx.open("main");
        write(&gfs, "/a.txt", "1");
        let outcome = gfs.commit().message("first").execute().unwrap();

        assert_eq!(outcome.status(), CommitStatus::Committed);
        let commit = outcome.commit().unwrap().clone();
        assert_eq!(fx.tip("main"), Some(commit.clone()));
        let info = fx.repo.read_commit(&commit).unwrap();
        assert!(info.parents.is_empty());
        assert_eq!(info.message, "first\n");
        assert_eq!(info.committer.name, "Test");
        assert_eq!(info.author, info.committer);
        assert!(!gfs.has_pending_changes().unwrap());
        assert_eq!(gfs.status().unwrap().head(), Some(&commit));
    }

    #[test]
    fn unchanged_trees_are_skipped() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a", "1")]);
        let gfs = fx.open("main");

        let outcome = gfs.commit().message("nothing").execute().unwrap();
        assert_eq!(outcome.status(), CommitStatus::NoChange);
        assert!(!outcome.is_successful());
        assert_eq!(fx.tip("main"), Some(base.clone()));

        let outcome = gfs
            .commit()
            .message("empty")
            .allow_empty(true)
            .execute()
            .unwrap();
        assert!(outcome.is_successful());
        assert_ne!(fx.tip("main"), Some(base));
    }

    #[test]
    fn amend_replaces_head() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a", "1")]);
        let head = fx.commit("main", &[&base], &[("a", "2")]);
        let gfs = fx.open("main");
        write(&gfs, "/a", "3");

        let outcome = gfs.commit().amend(true).execute().unwrap();
        let amended = outcome.commit().unwrap();
        let info = fx.repo.read_commit(amended).unwrap();
        assert_eq!(info.parents, vec![base]);
        assert_eq!(info.message, "update main\n");
        assert_eq!(info.author.name, "Test");
        assert_ne!(amended, &head);
        assert_eq!(read(&gfs, "/a"), "3");
    }

    #[test]
    fn explicit_tree_leaves_the_worktree_alone() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("a", "1")]);
        let gfs = fx.open("main");
        write(&gfs, "/b", "pending");
        let tree = fx.tree(&[("z", "z")]);

        let outcome = gfs.commit().message("graft").tree(tree.clone()).execute().unwrap();
        let info = fx.repo.read_commit(outcome.commit().unwrap()).unwrap();
        assert_eq!(info.tree, tree);
        assert!(gfs.has_pending_changes().unwrap());
    }

    #[test]
    fn lost_ref_race_is_rejected() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a", "1")]);
        let gfs = fx.open("main");
        let elsewhere = fx.commit("main", &[&base], &[("a", "other")]);
        write(&gfs, "/a", "mine");

        let err = gfs.commit().message("mine").execute().unwrap_err();
        assert!(matches!(err, GfsError::RefUpdateRejected { .. }));
        assert_eq!(fx.repo.resolve_ref(&fx.branch_ref("main")).unwrap(), Some(elsewhere));
        assert_eq!(gfs.status().unwrap().head(), Some(&base));
        assert!(gfs.has_pending_changes().unwrap());
    }

    #[test]
    fn missing_identity_fails() {
        let fx = Fixture {
            repo: std::sync::Arc::new(crate::git::MemoryRepo::new()),
        };
        let gfs = fx.open("main");
        write(&gfs, "/a", "1");
        assert!(matches!(
            gfs.commit().message("m").execute(),
            Err(GfsError::NoIdentity)
        ));
    }

    #[test]
    fn conflicting_merges_are_concluded_by_commit() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a.txt", "1")]);
        fx.commit("X", &[&base], &[("a.txt", "2")]);
        fx.commit("Y", &[&base], &[("a.txt", "3")]);
        let gfs = fx.open("X");
        gfs.merge("Y").execute().unwrap();
        assert_eq!(gfs.status().unwrap().state(), GfsState::MergingConflict);

        write(&gfs, "/a.txt", "resolved");
        let outcome = gfs.commit().execute().unwrap();
        let info = fx.repo.read_commit(outcome.commit().unwrap()).unwrap();
        assert_eq!(info.parents.len(), 2);
        assert!(info.message.contains("Conflicts:\n\ta.txt"));
        let status = gfs.status().unwrap();
        assert_eq!(status.state(), GfsState::Normal);
        assert!(status.merge_note().is_none());
    }
}
