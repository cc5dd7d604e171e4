//! gfs::builder
//!
//! Opening a file system handle on a branch, a commit, or a bare tree.

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::types::{BranchName, Oid, RefName};
use crate::git::{revision, Repository};

use super::node::NodeTree;
use super::{GfsError, GfsStatus, GitFileSystem};

#[derive(Debug, Clone)]
enum Source {
    /// Whatever branch the repository's HEAD names
    Head,
    Branch(String),
    Commit(String),
    Tree(Oid),
}

/// Opens a [`GitFileSystem`].
///
/// With no source set, the handle attaches to the branch the repository's
/// `HEAD` points at (which may not have a commit yet).
pub struct GfsBuilder {
    repo: Arc<dyn Repository>,
    source: Source,
    config: Option<Config>,
}

impl GfsBuilder {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            source: Source::Head,
            config: None,
        }
    }

    /// Attach to a branch. A branch with no commit yet opens empty.
    pub fn branch(mut self, name: impl Into<String>) -> Self {
        self.source = Source::Branch(name.into());
        self
    }

    /// Open detached at a revision.
    pub fn commit(mut self, revision: impl Into<String>) -> Self {
        self.source = Source::Commit(revision.into());
        self
    }

    /// Open detached over a tree, with no head commit.
    pub fn tree(mut self, tree: Oid) -> Self {
        self.source = Source::Tree(tree);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn open(self) -> Result<GitFileSystem, GfsError> {
        let repo = self.repo;
        let (status, tree) = match self.source {
            Source::Head => match repo.head_branch()? {
                Some(branch) => attach(&*repo, &branch)?,
                None => (GfsStatus::new(None, None), NodeTree::empty()),
            },
            Source::Branch(name) => attach(&*repo, &BranchName::new(name)?)?,
            Source::Commit(rev) => {
                let resolved = revision::resolve(&*repo, &rev)?
                    .ok_or(GfsError::NoSuchRevision(rev))?;
                let commit = repo.read_commit(&resolved.commit)?;
                (
                    GfsStatus::new(None, Some(commit.id)),
                    NodeTree::lazy(commit.tree),
                )
            }
            Source::Tree(id) => {
                repo.read_tree(&id)?;
                (GfsStatus::new(None, None), NodeTree::lazy(id))
            }
        };
        tracing::debug!(
            branch = status.branch().map(RefName::as_str),
            head = status.head().map(Oid::as_str),
            "opening file system"
        );
        Ok(GitFileSystem::assemble(
            repo,
            self.config.unwrap_or_default(),
            status,
            tree,
        ))
    }
}

fn attach(repo: &dyn Repository, branch: &BranchName) -> Result<(GfsStatus, NodeTree), GfsError> {
    let refname = RefName::for_branch(branch);
    match repo.resolve_ref(&refname)? {
        Some(head) => {
            let tree = repo.read_commit(&head)?.tree;
            Ok((
                GfsStatus::new(Some(refname), Some(head)),
                NodeTree::lazy(tree),
            ))
        }
        None => Ok((GfsStatus::new(Some(refname), None), NodeTree::empty())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::TreeEntry;
    use crate::core::types::{FileMode, Signature};
    use crate::git::{MemoryRepo, NewCommit, ObjectStore, RefStore};

    fn seeded() -> (Arc<MemoryRepo>, Oid, Oid) {
        let repo = Arc::new(MemoryRepo::new());
        let blob = repo.write_blob(b"content\n").unwrap();
        let tree = repo
            .write_tree(&[TreeEntry::new("file.txt", blob, FileMode::Regular)])
            .unwrap();
        let sig = Signature::at("T", "t@x", 0);
        let commit = repo
            .write_commit(&NewCommit {
                tree: tree.clone(),
                parents: vec![],
                author: sig.clone(),
                committer: sig,
                message: "init\n".into(),
            })
            .unwrap();
        repo.update_ref_cas(&RefName::new("refs/heads/main").unwrap(), &commit, None, "")
            .unwrap();
        (repo, commit, tree)
    }

    #[test]
    fn opens_head_branch_by_default() {
        let (repo, commit, _) = seeded();
        let gfs = GfsBuilder::new(repo).open().unwrap();
        let status = gfs.status().unwrap();
        assert_eq!(status.branch_name().unwrap().as_str(), "main");
        assert_eq!(status.head(), Some(&commit));
        let path = gfs.path("/file.txt").unwrap();
        assert_eq!(gfs.read(&path).unwrap(), b"content\n");
    }

    #[test]
    fn unborn_branch_opens_empty() {
        let (repo, _, _) = seeded();
        let gfs = GfsBuilder::new(repo).branch("fresh").open().unwrap();
        let status = gfs.status().unwrap();
        assert!(status.is_attached());
        assert!(status.head().is_none());
        assert!(gfs.list_directory(&gfs.root()).unwrap().is_empty());
    }

    #[test]
    fn commit_opens_detached() {
        let (repo, commit, _) = seeded();
        let gfs = GfsBuilder::new(repo).commit(commit.as_str()).open().unwrap();
        let status = gfs.status().unwrap();
        assert!(!status.is_attached());
        assert_eq!(status.head(), Some(&commit));
    }

    #[test]
    fn tree_opens_without_head() {
        let (repo, _, tree) = seeded();
        let gfs = GfsBuilder::new(repo).tree(tree).open().unwrap();
        assert!(gfs.status().unwrap().head().is_none());
        assert!(gfs.exists(&gfs.path("/file.txt").unwrap()).unwrap());
    }

    #[test]
    fn bad_sources_fail() {
        let (repo, _, _) = seeded();
        assert!(matches!(
            GfsBuilder::new(repo.clone()).commit("nope").open(),
            Err(GfsError::NoSuchRevision(_))
        ));
        assert!(matches!(
            GfsBuilder::new(repo).branch("bad..name").open(),
            Err(GfsError::Type(_))
        ));
    }
}
