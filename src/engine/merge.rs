//! engine::merge
//!
//! Merge another branch or commit into the attached branch.
//!
//! # Algorithm
//!
//! 1. A source already reachable from head: nothing to do
//! 2. Head reachable from the source: fast-forward, unless squashing
//! 3. Otherwise a three-way tree merge against the merge base
//!
//! The merged tree is applied to the working tree only when none of the
//! uncommitted edits would be clobbered by it. A clean, committed merge
//! moves the branch with a compare-and-swap before the node cache is
//! touched.

use std::collections::BTreeMap;

use crate::core::types::{MergeStrategy, Oid, RefName, Signature};
use crate::gfs::node::NodeTree;
use crate::gfs::{GfsError, GfsState, GitFileSystem, MergeNote, StatusUpdate};
use crate::git::{revision, CommitInfo, NewCommit};

use super::command::{
    self, default_committer, tree_of, Command, CommandStatus, Conflict, Invocation, Outcome,
};
use super::merge_file::Labels;
use super::merge_tree::TreeMerger;
use super::walk::walk;

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// The merged result would overwrite uncommitted edits; nothing changed
    CheckoutConflict,
    /// Fast-forward only was requested and the merge is not one
    Aborted,
    AlreadyUpToDate,
    FastForward,
    /// The source was applied as uncommitted edits
    FastForwardSquashed,
    Merged,
    MergedSquashed,
    /// Merged cleanly into the working tree; the next commit completes it
    MergedNotCommitted,
    /// Conflicts were written into the working tree
    Conflicting,
}

impl CommandStatus for MergeStatus {
    fn is_successful(self) -> bool {
        !matches!(
            self,
            MergeStatus::CheckoutConflict | MergeStatus::Aborted | MergeStatus::Conflicting
        )
    }
}

/// Merge a branch or revision into the attached branch.
#[derive(Debug)]
pub struct Merge {
    invocation: Invocation,
    source: String,
    strategy: Option<MergeStrategy>,
    squash: bool,
    fast_forward_only: bool,
    commit: bool,
    message: Option<String>,
    author: Option<Signature>,
    committer: Option<Signature>,
}

impl Merge {
    pub fn new(gfs: &GitFileSystem, source: impl Into<String>) -> Self {
        Self {
            invocation: Invocation::new(gfs),
            source: source.into(),
            strategy: None,
            squash: false,
            fast_forward_only: false,
            commit: true,
            message: None,
            author: None,
            committer: None,
        }
    }

    /// How files changed on both sides are settled. Defaults to the
    /// configured strategy.
    pub fn strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Apply the result as uncommitted edits with no second parent.
    pub fn squash(mut self, squash: bool) -> Self {
        self.squash = squash;
        self
    }

    pub fn fast_forward_only(mut self, only: bool) -> Self {
        self.fast_forward_only = only;
        self
    }

    /// Whether a clean merge is committed right away (default `true`).
    pub fn commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
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

    pub fn execute(&mut self) -> Result<Outcome<MergeStatus>, GfsError> {
        command::run(self)
    }
}

/// What the merge works with once the source is resolved.
struct Plan {
    branch: RefName,
    head: Option<Oid>,
    head_tree: Option<Oid>,
    source: Oid,
    source_tree: Oid,
    ours: String,
    theirs: String,
}

impl Command for Merge {
    const NAME: &'static str = "merge";
    const ACCEPTED: &'static [GfsState] = &[GfsState::Normal];
    const TRANSIENT: GfsState = GfsState::Merging;
    type Status = MergeStatus;

    fn invocation(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn run(
        &mut self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
    ) -> Result<Outcome<MergeStatus>, GfsError> {
        let repo = gfs.repo();
        let current = update.current().clone();
        let branch = current
            .branch()
            .cloned()
            .ok_or_else(|| GfsError::NoBranch("merge needs an attached branch".to_string()))?;

        let resolved = revision::resolve(repo, &self.source)?
            .ok_or_else(|| GfsError::NoSuchRevision(self.source.clone()))?;
        let theirs = resolved
            .branch
            .as_ref()
            .map_or_else(|| self.source.clone(), |b| b.short_name().to_string());
        let plan = Plan {
            ours: branch.short_name().to_string(),
            branch,
            head: current.head().cloned(),
            head_tree: tree_of(repo, current.head())?,
            source_tree: repo.read_commit(&resolved.commit)?.tree,
            source: resolved.commit,
            theirs,
        };

        if let Some(head) = &plan.head {
            if repo.is_ancestor(&plan.source, head)? {
                tracing::debug!(source = %self.source, "already up to date");
                update.revert();
                return Ok(Outcome::new(MergeStatus::AlreadyUpToDate).with_commit(Some(head.clone())));
            }
        }

        let head = match &plan.head {
            Some(head) if !repo.is_ancestor(head, &plan.source)? => head.clone(),
            _ if self.squash => return self.squash_fast_forward(gfs, update, &plan),
            _ => return self.fast_forward(gfs, update, &plan),
        };
        if self.fast_forward_only {
            tracing::debug!(source = %self.source, "not a fast-forward; aborting");
            update.revert();
            return Ok(Outcome::new(MergeStatus::Aborted));
        }
        self.three_way(gfs, update, &plan, head)
    }
}

impl Merge {
    fn fast_forward(
        &self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
        plan: &Plan,
    ) -> Result<Outcome<MergeStatus>, GfsError> {
        let repo = gfs.repo();
        let mut tree = gfs.lock_tree()?;
        let worktree = tree.root_id(repo, false)?;
        let walk = walk(repo, plan.head_tree.as_ref(), Some(&plan.source_tree), Some(&worktree))?;
        if walk.has_conflicts() {
            update.revert();
            return Ok(Outcome::new(MergeStatus::CheckoutConflict).with_conflicts(walk.conflicts()));
        }

        let mut next = NodeTree::lazy(plan.source_tree.clone());
        walk.apply_keeps(repo, &mut next)?;
        repo.update_ref_cas(
            &plan.branch,
            &plan.source,
            plan.head.as_ref(),
            &format!("merge {}: Fast-forward", self.source),
        )?;
        *tree = next;

        update
            .head(Some(plan.source.clone()))
            .merge_note(None)
            .state(GfsState::Normal);
        Ok(Outcome::new(MergeStatus::FastForward).with_commit(Some(plan.source.clone())))
    }

    fn squash_fast_forward(
        &self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
        plan: &Plan,
    ) -> Result<Outcome<MergeStatus>, GfsError> {
        let repo = gfs.repo();
        let mut tree = gfs.lock_tree()?;
        let worktree = tree.root_id(repo, false)?;
        let walk = walk(repo, plan.head_tree.as_ref(), Some(&plan.source_tree), Some(&worktree))?;
        if walk.has_conflicts() {
            update.revert();
            return Ok(Outcome::new(MergeStatus::CheckoutConflict).with_conflicts(walk.conflicts()));
        }

        let message = self.squash_message(gfs, plan)?;
        let mut next = tree.clone();
        walk.apply_takes(repo, &mut next)?;
        *tree = next;

        update
            .merge_note(Some(MergeNote::squash(message)))
            .state(GfsState::Normal);
        Ok(Outcome::new(MergeStatus::FastForwardSquashed))
    }

    fn three_way(
        &self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
        plan: &Plan,
        head: Oid,
    ) -> Result<Outcome<MergeStatus>, GfsError> {
        let repo = gfs.repo();
        let base = repo.merge_base(&head, &plan.source)?;
        let base_tree = tree_of(repo, base.as_ref())?;
        let merger = TreeMerger {
            store: repo,
            strategy: self.strategy.unwrap_or_else(|| gfs.config().merge_strategy()),
            labels: Labels {
                ours: &plan.ours,
                theirs: &plan.theirs,
            },
            marker_size: gfs.config().conflict_marker_size(),
        };
        let merged = merger.merge(
            base_tree.as_ref(),
            plan.head_tree.as_ref(),
            Some(&plan.source_tree),
        )?;

        let mut tree = gfs.lock_tree()?;
        let worktree = tree.root_id(repo, false)?;
        let walk = walk(repo, plan.head_tree.as_ref(), Some(&merged.tree), Some(&worktree))?;
        if walk.has_conflicts() {
            tracing::warn!(source = %self.source, "merge would overwrite uncommitted edits");
            update.revert();
            return Ok(Outcome::new(MergeStatus::CheckoutConflict).with_conflicts(walk.conflicts()));
        }

        let message = match &self.message {
            Some(message) => message.clone(),
            None if self.squash => self.squash_message(gfs, plan)?,
            None => format!("Merge branch '{}' into {}", plan.theirs, plan.ours),
        };

        if !merged.conflicts.is_empty() || self.squash || !self.commit {
            let mut next = tree.clone();
            walk.apply_takes(repo, &mut next)?;
            *tree = next;

            if !merged.conflicts.is_empty() {
                let message = with_conflict_list(message, &merged.conflicts);
                let (note, state) = if self.squash {
                    (MergeNote::squash(message), GfsState::Normal)
                } else {
                    (
                        MergeNote::merge(plan.source.clone(), message),
                        GfsState::MergingConflict,
                    )
                };
                update.merge_note(Some(note)).state(state);
                return Ok(Outcome::new(MergeStatus::Conflicting).with_conflicts(merged.conflicts));
            }
            if self.squash {
                update
                    .merge_note(Some(MergeNote::squash(message)))
                    .state(GfsState::Normal);
                return Ok(Outcome::new(MergeStatus::MergedSquashed));
            }
            update
                .merge_note(Some(MergeNote::merge(plan.source.clone(), message)))
                .state(GfsState::Merging);
            return Ok(Outcome::new(MergeStatus::MergedNotCommitted));
        }

        let committer = match &self.committer {
            Some(committer) => committer.clone(),
            None => default_committer(gfs)?,
        };
        let commit = repo.write_commit(&NewCommit {
            tree: merged.tree.clone(),
            parents: vec![head.clone(), plan.source.clone()],
            author: self.author.clone().unwrap_or_else(|| committer.clone()),
            committer,
            message: terminated(message),
        })?;
        repo.flush()?;

        let mut next = NodeTree::lazy(merged.tree);
        walk.apply_keeps(repo, &mut next)?;
        repo.update_ref_cas(
            &plan.branch,
            &commit,
            Some(&head),
            &format!("merge {}: Merge made by the '{}' strategy.", self.source, merger.strategy),
        )?;
        *tree = next;

        tracing::debug!(commit = %commit.short(7), "merge committed");
        update
            .head(Some(commit.clone()))
            .merge_note(None)
            .state(GfsState::Normal);
        Ok(Outcome::new(MergeStatus::Merged).with_commit(Some(commit)))
    }

    /// `Squashed commit of the following:` and a log of every commit the
    /// source has over head.
    fn squash_message(&self, gfs: &GitFileSystem, plan: &Plan) -> Result<String, GfsError> {
        if let Some(message) = &self.message {
            return Ok(message.clone());
        }
        let commits = gfs.repo().unmerged_commits(plan.head.as_ref(), &plan.source)?;
        let mut message = String::from("Squashed commit of the following:\n");
        for commit in &commits {
            message.push('\n');
            log_entry(&mut message, commit);
        }
        Ok(message)
    }
}

fn log_entry(out: &mut String, commit: &CommitInfo) {
    out.push_str(&format!(
        "commit {}\nAuthor: {}\nDate:   {}\n\n",
        commit.id,
        commit.author,
        commit.author.when.format("%a %b %-d %H:%M:%S %Y %z")
    ));
    for line in commit.message.trim_end().lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
}

fn with_conflict_list(mut message: String, conflicts: &BTreeMap<String, Conflict>) -> String {
    message.push_str("\n\nConflicts:\n");
    for path in conflicts.keys() {
        message.push('\t');
        message.push_str(path);
        message.push('\n');
    }
    message
}

fn terminated(mut message: String) -> String {
    if !message.ends_with('\n') {
        message.push('\n');
    }
    message
}
