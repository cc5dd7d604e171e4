//! engine::checkout
//!
//! Switch the handle to another branch or commit, carrying uncommitted
//! edits along when they do not collide with the switch.

use crate::core::types::{Oid, RefName};
use crate::gfs::node::NodeTree;
use crate::gfs::{GfsError, GfsState, GitFileSystem, StatusUpdate};
use crate::git::{revision, Repository};

use super::command::{self, tree_of, Command, CommandStatus, Invocation, Outcome};
use super::walk::walk;

/// Result of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStatus {
    Ok,
    /// Uncommitted edits would be lost; nothing changed
    Conflicting,
}

impl CommandStatus for CheckoutStatus {
    fn is_successful(self) -> bool {
        self == CheckoutStatus::Ok
    }
}

/// Check out a branch or a revision.
///
/// A branch name attaches the handle to that branch. With
/// [`Checkout::detach`], or when the target is not a branch, the handle
/// ends up detached at the target commit.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gitvfs::engine::CheckoutStatus;
/// use gitvfs::gfs::GfsBuilder;
/// use gitvfs::git::MemoryRepo;
///
/// let repo = Arc::new(MemoryRepo::new().with_identity("Jane", "jane@example.com"));
/// let gfs = GfsBuilder::new(repo).open().unwrap();
/// gfs.write(&gfs.path("/a.txt").unwrap(), b"1").unwrap();
/// gfs.commit().message("first").execute().unwrap();
///
/// let outcome = gfs.checkout("main").execute().unwrap();
/// assert_eq!(outcome.status(), CheckoutStatus::Ok);
/// ```
#[derive(Debug)]
pub struct Checkout {
    invocation: Invocation,
    target: String,
    force: bool,
    detach: bool,
}

impl Checkout {
    pub fn new(gfs: &GitFileSystem, target: impl Into<String>) -> Self {
        Self {
            invocation: Invocation::new(gfs),
            target: target.into(),
            force: false,
            detach: false,
        }
    }

    /// Overwrite conflicting uncommitted edits with the target's version.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Resolve the target as a revision and leave the handle detached.
    pub fn detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    pub fn execute(&mut self) -> Result<Outcome<CheckoutStatus>, GfsError> {
        command::run(self)
    }

    fn resolve(&self, repo: &dyn Repository) -> Result<(Oid, Option<RefName>), GfsError> {
        if self.detach {
            let resolved = revision::resolve(repo, &self.target)?
                .ok_or_else(|| GfsError::NoSuchRevision(self.target.clone()))?;
            return Ok((resolved.commit, None));
        }
        if let Some(resolved) = revision::resolve_branch(repo, &self.target)? {
            return Ok((resolved.commit, resolved.branch));
        }
        match revision::resolve(repo, &self.target)? {
            Some(resolved) => Ok((resolved.commit, resolved.branch)),
            None => Err(GfsError::NoBranch(self.target.clone())),
        }
    }
}

impl Command for Checkout {
    const NAME: &'static str = "checkout";
    const ACCEPTED: &'static [GfsState] = &[GfsState::Normal];
    const TRANSIENT: GfsState = GfsState::CheckingOut;
    type Status = CheckoutStatus;

    fn invocation(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    fn run(
        &mut self,
        gfs: &GitFileSystem,
        update: &mut StatusUpdate<'_>,
    ) -> Result<Outcome<CheckoutStatus>, GfsError> {
        let repo = gfs.repo();
        let (commit, branch) = self.resolve(repo)?;
        let target_tree = repo.read_commit(&commit)?.tree;
        let head_tree = tree_of(repo, update.current().head())?;

        let mut tree = gfs.lock_tree()?;
        let worktree = tree.root_id(repo, false)?;
        let walk = walk(repo, head_tree.as_ref(), Some(&target_tree), Some(&worktree))?;
        if walk.has_conflicts() && !self.force {
            tracing::warn!(target = %self.target, "checkout would overwrite uncommitted edits");
            update.revert();
            return Ok(Outcome::new(CheckoutStatus::Conflicting).with_conflicts(walk.conflicts()));
        }

        let mut next = NodeTree::lazy(target_tree);
        let kept = walk.apply_keeps(repo, &mut next)?;
        *tree = next;

        tracing::debug!(target = %self.target, commit = %commit.short(7), kept, "checked out");
        update
            .branch(branch)
            .head(Some(commit.clone()))
            .state(GfsState::Normal);
        Ok(Outcome::new(CheckoutStatus::Ok).with_commit(Some(commit)))
    }
}
