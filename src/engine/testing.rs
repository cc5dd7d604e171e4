//! Repository fixtures shared by the command tests.

use std::sync::Arc;

use crate::core::snapshot::EntryRef;
use crate::core::types::{FileMode, Oid, RefName, Signature};
use crate::gfs::node::{split_segments, NodeTree};
use crate::gfs::{GfsBuilder, GitFileSystem};
use crate::git::{MemoryRepo, NewCommit, ObjectStore, RefStore};

pub(crate) struct Fixture {
    pub(crate) repo: Arc<MemoryRepo>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self {
            repo: Arc::new(MemoryRepo::new().with_identity("Test", "test@example.com")),
        }
    }

    pub(crate) fn tree(&self, files: &[(&str, &str)]) -> Oid {
        let mut root = NodeTree::empty();
        for (path, content) in files {
            let blob = self.repo.write_blob(content.as_bytes()).unwrap();
            root.set_entry(
                &*self.repo,
                &split_segments(path.as_bytes()),
                Some(&EntryRef::new(blob, FileMode::Regular)),
            )
            .unwrap();
        }
        root.root_id(&*self.repo, true).unwrap()
    }

    /// Commit `files` on top of `parents` and point `branch` at it.
    pub(crate) fn commit(&self, branch: &str, parents: &[&Oid], files: &[(&str, &str)]) -> Oid {
        let sig = Signature::at("Test", "test@example.com", 1_700_000_000);
        let id = self
            .repo
            .write_commit(&NewCommit {
                tree: self.tree(files),
                parents: parents.iter().map(|p| (*p).clone()).collect(),
                author: sig.clone(),
                committer: sig,
                message: format!("update {branch}\n"),
            })
            .unwrap();
        let refname = self.branch_ref(branch);
        let current = self.repo.resolve_ref(&refname).unwrap();
        self.repo
            .update_ref_cas(&refname, &id, current.as_ref(), "fixture")
            .unwrap();
        id
    }

    pub(crate) fn branch_ref(&self, branch: &str) -> RefName {
        RefName::new(format!("{}{}", RefName::HEADS, branch)).unwrap()
    }

    pub(crate) fn tip(&self, branch: &str) -> Option<Oid> {
        self.repo.resolve_ref(&self.branch_ref(branch)).unwrap()
    }

    pub(crate) fn open(&self, branch: &str) -> GitFileSystem {
        GfsBuilder::new(self.repo.clone()).branch(branch).open().unwrap()
    }
}

pub(crate) fn write(gfs: &GitFileSystem, path: &str, content: &str) {
    let path = gfs.path(path).unwrap();
    if let Some(parent) = path.parent() {
        gfs.create_directories(&parent).unwrap();
    }
    gfs.write(&path, content.as_bytes()).unwrap();
}

pub(crate) fn read(gfs: &GitFileSystem, path: &str) -> String {
    gfs.read_to_string(&gfs.path(path).unwrap()).unwrap()
}
