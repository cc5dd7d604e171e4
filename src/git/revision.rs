//! git::revision
//!
//! Turning user-supplied revision strings into commits.
//!
//! A revision is tried, in order, as a branch name, a full ref name, a tag
//! name, and finally a full hex object id that names a commit.

use crate::core::types::{BranchName, Oid, RefName};

use super::{GitError, Repository};

/// A revision string resolved against a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// The commit the revision names
    pub commit: Oid,
    /// The branch ref, when the revision named a branch
    pub branch: Option<RefName>,
}

/// Resolve `revision` to a commit, or `None` if nothing matches.
///
/// # Example
///
/// ```
/// use gitvfs::git::{revision, MemoryRepo};
///
/// let repo = MemoryRepo::new();
/// assert!(revision::resolve(&repo, "main").unwrap().is_none());
/// ```
pub fn resolve<R: Repository + ?Sized>(
    repo: &R,
    revision: &str,
) -> Result<Option<Resolved>, GitError> {
    if let Some(found) = resolve_branch(repo, revision)? {
        return Ok(Some(found));
    }

    if let Ok(name) = RefName::new(revision) {
        if revision.starts_with("refs/") {
            if let Some(commit) = repo.resolve_ref(&name)? {
                let branch = name.is_branch_ref().then_some(name);
                return Ok(Some(Resolved { commit, branch }));
            }
        }
    }

    if let Ok(tag) = RefName::new(format!("{}{}", RefName::TAGS, revision)) {
        if let Some(commit) = repo.resolve_ref(&tag)? {
            return Ok(Some(Resolved {
                commit,
                branch: None,
            }));
        }
    }

    if Oid::is_hex_id(revision) {
        let id = Oid::new(revision)?;
        if repo.has_object(&id)? && repo.read_commit(&id).is_ok() {
            return Ok(Some(Resolved {
                commit: id,
                branch: None,
            }));
        }
    }

    Ok(None)
}

/// Resolve `name` strictly as a local branch.
pub fn resolve_branch<R: Repository + ?Sized>(
    repo: &R,
    name: &str,
) -> Result<Option<Resolved>, GitError> {
    let Ok(branch) = BranchName::new(name) else {
        return Ok(None);
    };
    let refname = RefName::for_branch(&branch);
    Ok(repo.resolve_ref(&refname)?.map(|commit| Resolved {
        commit,
        branch: Some(refname),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::TreeEntry;
    use crate::core::types::Signature;
    use crate::git::{MemoryRepo, NewCommit, ObjectStore, RefStore};

    fn seeded() -> (MemoryRepo, Oid) {
        let repo = MemoryRepo::new();
        let tree = repo.write_tree(&Vec::<TreeEntry>::new()).unwrap();
        let sig = Signature::at("T", "t@x", 1);
        let commit = repo
            .write_commit(&NewCommit {
                tree,
                parents: vec![],
                author: sig.clone(),
                committer: sig,
                message: "init\n".into(),
            })
            .unwrap();
        repo.update_ref_cas(&RefName::new("refs/heads/main").unwrap(), &commit, None, "")
            .unwrap();
        repo.update_ref_cas(&RefName::new("refs/tags/v1").unwrap(), &commit, None, "")
            .unwrap();
        (repo, commit)
    }

    #[test]
    fn branch_names_attach() {
        let (repo, commit) = seeded();
        let resolved = resolve(&repo, "main").unwrap().unwrap();
        assert_eq!(resolved.commit, commit);
        assert_eq!(resolved.branch.unwrap().as_str(), "refs/heads/main");
    }

    #[test]
    fn full_refs_and_tags() {
        let (repo, commit) = seeded();
        let full = resolve(&repo, "refs/heads/main").unwrap().unwrap();
        assert!(full.branch.is_some());
        let tag = resolve(&repo, "v1").unwrap().unwrap();
        assert_eq!(tag.commit, commit);
        assert!(tag.branch.is_none());
    }

    #[test]
    fn raw_ids_detach() {
        let (repo, commit) = seeded();
        let resolved = resolve(&repo, commit.as_str()).unwrap().unwrap();
        assert_eq!(resolved.commit, commit);
        assert!(resolved.branch.is_none());
    }

    #[test]
    fn unknown_revisions_are_none() {
        let (repo, _) = seeded();
        assert!(resolve(&repo, "nope").unwrap().is_none());
        assert!(resolve(&repo, &"f".repeat(64)).unwrap().is_none());
        assert!(resolve_branch(&repo, "v1").unwrap().is_none());
    }
}
