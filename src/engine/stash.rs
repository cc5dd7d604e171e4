//! engine::stash
//!
//! Shelve uncommitted edits as stash commits, and bring them back.
//!
//! A stash is two commits over head, laid out the way git lays them out:
//! an index commit with parent `[head]`, and the stash commit itself with
//! parents `[head, index]`. Both carry the working tree. The stash list is
//! append-only; applying an entry does not drop it.

use crate::core::types::{MergeStrategy, Oid, RefName, Signature};
use crate::gfs::node::NodeTree;
use crate::gfs::{GfsError, GfsState, GitFileSystem, StatusUpdate};
use crate::git::{NewCommit, StashEntry};

use super::command::{self, default_committer, Command, CommandStatus, Invocation, Outcome};
use super::merge_file::Labels;
use super::merge_tree::TreeMerger;
use super::walk::walk;

/// Result of creating a stash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashStatus {
    Committed,
    /// The working tree matched head
    NoChange,
}

impl CommandStatus for StashStatus {
    fn is_successful(self) -> bool {
        self == StashStatus::Committed
    }
}

/// Result of applying a stash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStashStatus {
    Success,
    Conflicting,
}

impl CommandStatus for ApplyStashStatus {
    fn is_successful(self) -> bool {
        self == ApplyStashStatus::Success
    }
}

/// Stash the working tree and reset it to head.
#[derive(Debug)]
pub struct CreateStash {
    invocation: Invocation,
    message: Option<String>,
    committer: Option<Signature>,
}

impl CreateStash {
    pub fn new(gfs: &GitFileSystem) -> Self {
        Self {
            invocation: Invocation::new(gfs),
            message: None,
            committer: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn execute(&mut self) -> Result<Outcome<StashStatus>, GfsError> {
        command::run(self)
    }
}

impl Command for CreateStash {
    const NAME: &'static str = "stash";
    const ACCEPTED: &'static [GfsState] = &[GfsState::Normal];
    const TRANSIENT: GfsState = GfsState::Stashing;
    type Status = StashStatus;

    fn invocation(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn run(
        &mut self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
    ) -> Result<Outcome<StashStatus>, GfsError> {
        let repo = gfs.repo();
        let current = update.current().clone();
        let head = current.head().cloned().ok_or(GfsError::NoHeadCommit)?;
        let head_info = repo.read_commit(&head)?;

        let mut tree = gfs.lock_tree()?;
        let worktree = tree.root_id(repo, false)?;
        if worktree == head_info.tree {
            tracing::debug!("no local changes to stash");
            update.revert();
            return Ok(Outcome::new(StashStatus::NoChange));
        }

        let on = current
            .branch()
            .map_or("(no branch)", RefName::short_name)
            .to_string();
        let summary = format!("{} {}", head.short(7), head_info.summary());
        let committer = match &self.committer {
            Some(committer) => committer.clone(),
            None => default_committer(gfs)?,
        };
        let message = match &self.message {
            Some(message) => format!("On {on}: {message}"),
            None => format!("WIP on {on}: {summary}"),
        };

        let index = repo.write_commit(&NewCommit {
            tree: worktree.clone(),
            parents: vec![head.clone()],
            author: committer.clone(),
            committer: committer.clone(),
            message: format!("index on {on}: {summary}\n"),
        })?;
        let stash = repo.write_commit(&NewCommit {
            tree: worktree,
            parents: vec![head.clone(), index],
            author: committer.clone(),
            committer,
            message: format!("{message}\n"),
        })?;
        repo.flush()?;

        let previous = repo.resolve_ref(&RefName::stash())?;
        repo.push_stash(&stash, previous.as_ref(), &message)?;
        tree.update_origin(head_info.tree);

        tracing::debug!(stash = %stash.short(7), "stashed working tree");
        update.state(current.state());
        Ok(Outcome::new(StashStatus::Committed).with_commit(Some(stash)))
    }
}

/// Apply a stash entry to the working tree.
#[derive(Debug)]
pub struct ApplyStash {
    invocation: Invocation,
    index: usize,
}

impl ApplyStash {
    pub fn new(gfs: &GitFileSystem) -> Self {
        Self {
            invocation: Invocation::new(gfs),
            index: 0,
        }
    }

    /// Which entry to apply; 0, the default, is the most recent.
    pub fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn execute(&mut self) -> Result<Outcome<ApplyStashStatus>, GfsError> {
        command::run(self)
    }
}

impl Command for ApplyStash {
    const NAME: &'static str = "stash apply";
    const ACCEPTED: &'static [GfsState] = &[GfsState::Normal];
    const TRANSIENT: GfsState = GfsState::ApplyingStash;
    type Status = ApplyStashStatus;

    fn invocation(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn run(
        &mut self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
    ) -> Result<Outcome<ApplyStashStatus>, GfsError> {
        let repo = gfs.repo();
        let entry = repo
            .stash_entries()?
            .into_iter()
            .nth(self.index)
            .ok_or_else(|| GfsError::NoSuchRevision(format!("stash@{{{}}}", self.index)))?;
        let stash = repo.read_commit(&entry.id)?;
        let base: &Oid = stash.parents.first().ok_or_else(|| {
            GfsError::Internal(format!("stash commit {} has no parent", entry.id))
        })?;
        let base_tree = repo.read_commit(base)?.tree;

        let mut tree = gfs.lock_tree()?;
        let worktree = tree.root_id(repo, false)?;
        let merged = TreeMerger {
            store: repo,
            // Always line-merged; the configured strategy only governs `merge`.
            strategy: MergeStrategy::Recursive,
            labels: Labels {
                ours: "Updated upstream",
                theirs: "Stashed changes",
            },
            marker_size: gfs.config().conflict_marker_size(),
        }
        .merge(Some(&base_tree), Some(&worktree), Some(&stash.tree))?;

        // Every path the merge changed is taken over the working tree.
        let walk = walk(repo, Some(&worktree), Some(&merged.tree), Some(&worktree))?;
        let mut next = NodeTree::clone(&tree);
        walk.apply_takes(repo, &mut next)?;
        *tree = next;

        tracing::debug!(stash = %entry.id.short(7), conflicts = merged.conflicts.len(), "applied stash");
        update.state(GfsState::Normal);
        let status = if merged.conflicts.is_empty() {
            ApplyStashStatus::Success
        } else {
            ApplyStashStatus::Conflicting
        };
        Ok(Outcome::new(status)
            .with_commit(Some(entry.id))
            .with_conflicts(merged.conflicts))
    }
}

impl GitFileSystem {
    /// The stash list, most recent first.
    pub fn stash_list(&self) -> Result<Vec<StashEntry>, GfsError> {
        self.ensure_open()?;
        Ok(self.repo().stash_entries()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::engine::testing::{read, write, Fixture};
    use crate::gfs::GfsBuilder;
    use crate::git::ObjectStore;

    #[test]
    fn round_trip_restores_edits() {
        let fx = Fixture::new();
        let head = fx.commit("main", &[], &[("a.txt", "1"), ("b.txt", "b")]);
        let gfs = fx.open("main");
        write(&gfs, "/a.txt", "edited");

        let outcome = gfs.stash().execute().unwrap();
        assert_eq!(outcome.status(), StashStatus::Committed);
        assert_eq!(read(&gfs, "/a.txt"), "1");
        assert!(!gfs.has_pending_changes().unwrap());
        assert_eq!(gfs.status().unwrap().head(), Some(&head));
        assert_eq!(fx.tip("main"), Some(head.clone()));

        let stash = fx.repo.read_commit(outcome.commit().unwrap()).unwrap();
        assert_eq!(stash.parents.len(), 2);
        assert_eq!(stash.parents[0], head);
        assert!(stash.message.starts_with("WIP on main: "));
        let index = fx.repo.read_commit(&stash.parents[1]).unwrap();
        assert!(index.message.starts_with("index on main: "));

        let applied = gfs.stash_apply().execute().unwrap();
        assert_eq!(applied.status(), ApplyStashStatus::Success);
        assert_eq!(read(&gfs, "/a.txt"), "edited");
        assert!(gfs.has_pending_changes().unwrap());
        assert_eq!(gfs.stash_list().unwrap().len(), 1);
    }

    #[test]
    fn clean_worktree_has_nothing_to_stash() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("a.txt", "1")]);
        let gfs = fx.open("main");
        let outcome = gfs.stash().execute().unwrap();
        assert_eq!(outcome.status(), StashStatus::NoChange);
        assert!(!outcome.is_successful());
        assert!(gfs.stash_list().unwrap().is_empty());
    }

    #[test]
    fn entries_stack_newest_first() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("a.txt", "1")]);
        let gfs = fx.open("main");
        write(&gfs, "/a.txt", "first");
        gfs.stash().message("one").execute().unwrap();
        write(&gfs, "/a.txt", "second");
        gfs.stash().message("two").execute().unwrap();

        let list = gfs.stash_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].message, "On main: two");

        gfs.stash_apply().index(1).execute().unwrap();
        assert_eq!(read(&gfs, "/a.txt"), "first");
    }

    #[test]
    fn colliding_edits_conflict() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("a.txt", "1\n")]);
        let gfs = fx.open("main");
        write(&gfs, "/a.txt", "stashed\n");
        gfs.stash().execute().unwrap();
        write(&gfs, "/a.txt", "upstream\n");

        let outcome = gfs.stash_apply().execute().unwrap();
        assert_eq!(outcome.status(), ApplyStashStatus::Conflicting);
        assert_eq!(
            read(&gfs, "/a.txt"),
            "<<<<<<< Updated upstream\nupstream\n=======\nstashed\n>>>>>>> Stashed changes\n"
        );
    }

    #[test]
    fn configured_strategy_still_reports_conflicts() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("a.txt", "1\n")]);
        let config = Config::from_toml_str("[merge]\nstrategy = \"ours\"\n").unwrap();
        let gfs = GfsBuilder::new(fx.repo.clone())
            .branch("main")
            .config(config)
            .open()
            .unwrap();
        write(&gfs, "/a.txt", "stashed\n");
        gfs.stash().execute().unwrap();
        write(&gfs, "/a.txt", "upstream\n");

        let outcome = gfs.stash_apply().execute().unwrap();
        assert_eq!(outcome.status(), ApplyStashStatus::Conflicting);
        assert_eq!(
            read(&gfs, "/a.txt"),
            "<<<<<<< Updated upstream\nupstream\n=======\nstashed\n>>>>>>> Stashed changes\n"
        );
    }

    #[test]
    fn missing_entries_fail() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("a.txt", "1")]);
        let gfs = fx.open("main");
        assert!(matches!(
            gfs.stash_apply().execute(),
            Err(GfsError::NoSuchRevision(_))
        ));
    }
}
