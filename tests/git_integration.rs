//! Integration tests against real git repositories.
//!
//! Each test creates a bare repository in a temporary directory through
//! git2, so nothing depends on a `git` binary or the user's git config.

use std::sync::Arc;

use tempfile::TempDir;

use gitvfs::core::config::Config;
use gitvfs::core::types::{FileMode, Oid, RefName, Signature};
use gitvfs::engine::{CommitStatus, MergeStatus, StashStatus};
use gitvfs::gfs::{GfsBuilder, GfsError, GfsState, GitFileSystem};
use gitvfs::git::{Git, ObjectStore, RefStore};
use gitvfs::staging::CommitBuilder;

/// A bare repository in a temporary directory.
struct TestRepo {
    dir: TempDir,
    git: Arc<Git>,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let git = Arc::new(Git::init_bare(dir.path()).expect("failed to init repo"));
        Self { dir, git }
    }

    fn signature() -> Signature {
        Signature::at("Test User", "test@example.com", 1_700_000_000)
    }

    fn config() -> Config {
        Config::from_toml_str(
            "[user]\nname = \"Test User\"\nemail = \"test@example.com\"\n",
        )
        .unwrap()
    }

    fn commit(&self, branch: &str, parent: Option<&Oid>, files: &[(&str, &str)]) -> Oid {
        let mut builder = CommitBuilder::new(self.git.clone())
            .on_branch(branch)
            .committer(Self::signature());
        if let Some(parent) = parent {
            builder = builder.parent(parent.clone());
        }
        for (path, content) in files {
            builder = builder.add_file(*path, *content);
        }
        builder
            .message(format!("update {branch}"))
            .execute()
            .expect("failed to build commit")
    }

    fn open(&self, branch: &str) -> GitFileSystem {
        GfsBuilder::new(self.git.clone())
            .branch(branch)
            .config(Self::config())
            .open()
            .expect("failed to open file system")
    }

    fn tip(&self, branch: &str) -> Option<Oid> {
        let refname = RefName::new(format!("refs/heads/{branch}")).unwrap();
        self.git.resolve_ref(&refname).unwrap()
    }
}

fn write(gfs: &GitFileSystem, path: &str, content: &str) {
    let path = gfs.path(path).unwrap();
    if let Some(parent) = path.parent() {
        gfs.create_directories(&parent).unwrap();
    }
    gfs.write(&path, content.as_bytes()).unwrap();
}

fn read(gfs: &GitFileSystem, path: &str) -> String {
    gfs.read_to_string(&gfs.path(path).unwrap()).unwrap()
}

#[test]
fn commits_survive_reopening() {
    let repo = TestRepo::new();
    let gfs = repo.open("main");
    write(&gfs, "/docs/readme.md", "hello\n");
    let run = gfs.path("/run.sh").unwrap();
    gfs.write(&run, b"#!/bin/sh\n").unwrap();
    gfs.set_executable(&run, true).unwrap();

    let outcome = gfs.commit().message("initial").execute().unwrap();
    assert_eq!(outcome.status(), CommitStatus::Committed);
    gfs.close().unwrap();

    let reopened = Arc::new(Git::open(repo.dir.path()).unwrap());
    let gfs = GfsBuilder::new(reopened).branch("main").open().unwrap();
    assert_eq!(read(&gfs, "/docs/readme.md"), "hello\n");
    let meta = gfs.metadata(&gfs.path("/run.sh").unwrap()).unwrap();
    assert_eq!(meta.mode(), FileMode::Executable);
}

#[test]
fn open_at_commit_is_detached() {
    let repo = TestRepo::new();
    let first = repo.commit("main", None, &[("a.txt", "1")]);
    repo.commit("main", None, &[("a.txt", "2")]);

    let gfs = GfsBuilder::new(repo.git.clone())
        .commit(first.as_str())
        .open()
        .unwrap();
    let status = gfs.status().unwrap();
    assert!(!status.is_attached());
    assert_eq!(status.head(), Some(&first));
    assert_eq!(read(&gfs, "/a.txt"), "1");
}

#[test]
fn concurrent_commits_lose_the_race_cleanly() {
    let repo = TestRepo::new();
    let base = repo.commit("main", None, &[("a.txt", "1")]);
    let one = repo.open("main");
    let two = repo.open("main");

    write(&one, "/a.txt", "one");
    one.commit().message("one").execute().unwrap();

    write(&two, "/a.txt", "two");
    let before = two.status().unwrap();
    assert!(matches!(
        two.commit().message("two").execute(),
        Err(GfsError::RefUpdateRejected { .. })
    ));
    assert_eq!(two.status().unwrap(), before);
    assert_eq!(before.head(), Some(&base));
    assert_eq!(read(&two, "/a.txt"), "two");
}

#[test]
fn merge_conflict_then_resolution() {
    let repo = TestRepo::new();
    let base = repo.commit("main", None, &[("a.txt", "1\n")]);
    let x = repo.commit("X", Some(&base), &[("a.txt", "2\n")]);
    let y = repo.commit("Y", Some(&base), &[("a.txt", "3\n")]);
    let gfs = repo.open("X");

    let outcome = gfs.merge("Y").execute().unwrap();
    assert_eq!(outcome.status(), MergeStatus::Conflicting);
    assert_eq!(read(&gfs, "/a.txt"), "<<<<<<< X\n2\n=======\n3\n>>>>>>> Y\n");
    assert_eq!(gfs.status().unwrap().state(), GfsState::MergingConflict);

    write(&gfs, "/a.txt", "resolved\n");
    let outcome = gfs.commit().execute().unwrap();
    let merge = outcome.commit().unwrap().clone();
    let info = repo.git.read_commit(&merge).unwrap();
    assert_eq!(info.parents, vec![x, y]);
    assert_eq!(repo.tip("X"), Some(merge));
}

#[test]
fn stash_lands_in_the_reflog() {
    let repo = TestRepo::new();
    repo.commit("main", None, &[("a.txt", "1")]);
    let gfs = repo.open("main");

    write(&gfs, "/a.txt", "first");
    gfs.stash().message("first").execute().unwrap();
    write(&gfs, "/a.txt", "second");
    let outcome = gfs.stash().execute().unwrap();
    assert_eq!(outcome.status(), StashStatus::Committed);

    let list = gfs.stash_list().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(&list[0].id, outcome.commit().unwrap());
    assert!(list[0].message.starts_with("WIP on main: "));
    assert_eq!(list[1].message, "On main: first");

    gfs.stash_apply().index(1).execute().unwrap();
    assert_eq!(read(&gfs, "/a.txt"), "first");
}

#[test]
fn imported_directories_become_trees() {
    let source = TempDir::new().unwrap();
    std::fs::create_dir_all(source.path().join("nested")).unwrap();
    std::fs::write(source.path().join("nested/file.txt"), "data\n").unwrap();

    let repo = TestRepo::new();
    let commit = CommitBuilder::new(repo.git.clone())
        .on_branch("main")
        .committer(TestRepo::signature())
        .import_directory("", source.path())
        .message("import")
        .execute()
        .unwrap();

    let tree = repo.git.read_commit(&commit).unwrap().tree;
    let root = repo.git.read_tree(&tree).unwrap();
    let nested = root.get(b"nested").unwrap();
    assert_eq!(nested.mode, FileMode::Tree);

    let gfs = repo.open("main");
    assert_eq!(read(&gfs, "/nested/file.txt"), "data\n");
}
