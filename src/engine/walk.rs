//! engine::walk
//!
//! The three-tree walk behind checkout and every change applied to the
//! working tree.
//!
//! For each path the walk compares the head tree, the target tree and the
//! working tree:
//!
//! | condition              | action                               |
//! |------------------------|--------------------------------------|
//! | target == worktree     | nothing                              |
//! | target == head         | keep the worktree's version          |
//! | head == worktree       | take the target's version            |
//! | target, worktree trees | recurse                              |
//! | otherwise              | conflict                             |

use std::collections::{BTreeMap, BTreeSet};

use crate::core::snapshot::EntryRef;
use crate::core::types::Oid;
use crate::gfs::node::{split_segments, NodeTree};
use crate::gfs::GfsError;
use crate::git::ObjectStore;

use super::command::{path_string, Conflict};

/// What to do with one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    /// The worktree changed this path and the target did not
    Keep(Option<EntryRef>),
    /// The target changed this path and the worktree did not
    Take(Option<EntryRef>),
    Conflict {
        head: Option<EntryRef>,
        target: Option<EntryRef>,
        worktree: Option<EntryRef>,
    },
}

/// Every path needing an action, keyed by slash-separated path.
#[derive(Debug, Default)]
pub(crate) struct Walk {
    pub(crate) actions: BTreeMap<Vec<u8>, Action>,
}

impl Walk {
    pub(crate) fn conflicts(&self) -> BTreeMap<String, Conflict> {
        self.actions
            .iter()
            .filter_map(|(path, action)| match action {
                Action::Conflict {
                    head,
                    target,
                    worktree,
                } => {
                    let mut conflict = Conflict::new(path_string(path));
                    conflict.head = head.clone();
                    conflict.target = target.clone();
                    conflict.worktree = worktree.clone();
                    Some((conflict.path.clone(), conflict))
                }
                _ => None,
            })
            .collect()
    }

    pub(crate) fn has_conflicts(&self) -> bool {
        self.actions
            .values()
            .any(|action| matches!(action, Action::Conflict { .. }))
    }

    /// Apply target-side changes to a working tree that still holds its
    /// own edits.
    pub(crate) fn apply_takes<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        tree: &mut NodeTree,
    ) -> Result<usize, GfsError> {
        let mut applied = 0;
        for (path, action) in &self.actions {
            if let Action::Take(entry) = action {
                tree.set_entry(store, &split_segments(path), entry.as_ref())?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Re-apply worktree edits after the tree was rebound to the target.
    pub(crate) fn apply_keeps<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        tree: &mut NodeTree,
    ) -> Result<usize, GfsError> {
        let mut applied = 0;
        for (path, action) in &self.actions {
            if let Action::Keep(entry) = action {
                tree.set_entry(store, &split_segments(path), entry.as_ref())?;
                applied += 1;
            }
        }
        Ok(applied)
    }
}

fn as_tree(entry: Option<&EntryRef>) -> Option<&Oid> {
    entry.filter(|e| e.is_tree()).map(|e| &e.id)
}

fn load<S: ObjectStore + ?Sized>(
    store: &S,
    tree: Option<&Oid>,
) -> Result<BTreeMap<Vec<u8>, EntryRef>, GfsError> {
    let Some(id) = tree else {
        return Ok(BTreeMap::new());
    };
    Ok(store
        .read_tree(id)?
        .entries()
        .iter()
        .map(|entry| (entry.name.clone(), entry.entry_ref()))
        .collect())
}

/// Walk three trees, any of which may be absent.
pub(crate) fn walk<S: ObjectStore + ?Sized>(
    store: &S,
    head: Option<&Oid>,
    target: Option<&Oid>,
    worktree: Option<&Oid>,
) -> Result<Walk, GfsError> {
    let mut walk = Walk::default();
    if target != worktree {
        walk_dir(store, &[], head, target, worktree, &mut walk)?;
    }
    Ok(walk)
}

fn walk_dir<S: ObjectStore + ?Sized>(
    store: &S,
    prefix: &[u8],
    head: Option<&Oid>,
    target: Option<&Oid>,
    worktree: Option<&Oid>,
    walk: &mut Walk,
) -> Result<(), GfsError> {
    let heads = load(store, head)?;
    let targets = load(store, target)?;
    let worktrees = load(store, worktree)?;
    let names: BTreeSet<&Vec<u8>> = heads
        .keys()
        .chain(targets.keys())
        .chain(worktrees.keys())
        .collect();

    for name in names {
        let h = heads.get(name);
        let t = targets.get(name);
        let w = worktrees.get(name);
        if t == w {
            continue;
        }
        let mut path = prefix.to_vec();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(name);

        let action = if t == h {
            Action::Keep(w.cloned())
        } else if h == w {
            Action::Take(t.cloned())
        } else if let (Some(t_tree), Some(w_tree)) = (as_tree(t), as_tree(w)) {
            walk_dir(store, &path, as_tree(h), Some(t_tree), Some(w_tree), walk)?;
            continue;
        } else {
            Action::Conflict {
                head: h.cloned(),
                target: t.cloned(),
                worktree: w.cloned(),
            }
        };
        walk.actions.insert(path, action);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileMode;
    use crate::git::MemoryRepo;

    fn tree(repo: &MemoryRepo, files: &[(&str, &str)]) -> Oid {
        let mut root = NodeTree::empty();
        for (path, content) in files {
            let blob = repo.write_blob(content.as_bytes()).unwrap();
            root.set_entry(
                repo,
                &split_segments(path.as_bytes()),
                Some(&EntryRef::new(blob, FileMode::Regular)),
            )
            .unwrap();
        }
        root.root_id(repo, true).unwrap()
    }

    #[test]
    fn identical_target_and_worktree_is_empty() {
        let repo = MemoryRepo::new();
        let a = tree(&repo, &[("f", "1")]);
        let b = tree(&repo, &[("f", "2")]);
        assert!(walk(&repo, Some(&a), Some(&b), Some(&b))
            .unwrap()
            .actions
            .is_empty());
    }

    #[test]
    fn classifies_keep_take_and_conflict() {
        let repo = MemoryRepo::new();
        let head = tree(&repo, &[("keep", "h"), ("take", "h"), ("clash", "h")]);
        let target = tree(&repo, &[("keep", "h"), ("take", "t"), ("clash", "t")]);
        let worktree = tree(&repo, &[("keep", "w"), ("take", "h"), ("clash", "w")]);
        let walk = walk(&repo, Some(&head), Some(&target), Some(&worktree)).unwrap();

        assert!(matches!(walk.actions[&b"keep".to_vec()], Action::Keep(Some(_))));
        assert!(matches!(walk.actions[&b"take".to_vec()], Action::Take(Some(_))));
        assert!(matches!(
            walk.actions[&b"clash".to_vec()],
            Action::Conflict { .. }
        ));
        let conflicts = walk.conflicts();
        assert_eq!(conflicts.keys().collect::<Vec<_>>(), vec!["clash"]);
    }

    #[test]
    fn recurses_into_shared_directories() {
        let repo = MemoryRepo::new();
        let head = tree(&repo, &[("d/a", "1"), ("d/b", "1")]);
        let target = tree(&repo, &[("d/a", "2"), ("d/b", "1")]);
        let worktree = tree(&repo, &[("d/a", "1"), ("d/b", "3")]);
        let walk = walk(&repo, Some(&head), Some(&target), Some(&worktree)).unwrap();
        assert!(!walk.has_conflicts());
        assert!(matches!(walk.actions[&b"d/a".to_vec()], Action::Take(_)));
        assert!(matches!(walk.actions[&b"d/b".to_vec()], Action::Keep(_)));
    }

    #[test]
    fn missing_head_treats_additions_as_edits() {
        let repo = MemoryRepo::new();
        let target = tree(&repo, &[("t", "1")]);
        let worktree = tree(&repo, &[("w", "1")]);
        let walk = walk(&repo, None, Some(&target), Some(&worktree)).unwrap();
        assert!(matches!(walk.actions[&b"t".to_vec()], Action::Take(Some(_))));
        assert!(matches!(walk.actions[&b"w".to_vec()], Action::Keep(Some(_))));
    }

    #[test]
    fn applying_keeps_after_rebinding() {
        let repo = MemoryRepo::new();
        let head = tree(&repo, &[("a", "1"), ("b", "1")]);
        let target = tree(&repo, &[("a", "2"), ("b", "1")]);
        let worktree = tree(&repo, &[("a", "1"), ("b", "edited")]);
        let walk = walk(&repo, Some(&head), Some(&target), Some(&worktree)).unwrap();

        let mut nodes = NodeTree::lazy(target);
        assert_eq!(walk.apply_keeps(&repo, &mut nodes).unwrap(), 1);
        let expected = tree(&repo, &[("a", "2"), ("b", "edited")]);
        assert_eq!(nodes.root_id(&repo, false).unwrap(), expected);

        let mut nodes = NodeTree::lazy(worktree);
        assert_eq!(walk.apply_takes(&repo, &mut nodes).unwrap(), 1);
        assert_eq!(nodes.root_id(&repo, false).unwrap(), expected);
    }
}
