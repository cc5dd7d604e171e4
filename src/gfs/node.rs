//! gfs::node
//!
//! The in-memory tree behind a file system handle.
//!
//! # Model
//!
//! Every node remembers the object it was loaded from. Directories load
//! their children from that tree only when first traversed; files read
//! their blob only when first read. A mutation turns a file's content into
//! an in-memory buffer and marks the node and every ancestor dirty.
//!
//! Resolving a node's id returns the remembered id for clean nodes and
//! writes a new blob or tree for dirty ones. With `persist`, the new id
//! becomes the node's origin and the node is clean again, so a second
//! resolve writes nothing.
//!
//! Directories with no files anywhere beneath them are left out of the
//! resolved tree. The root always resolves to a tree, possibly empty.

use std::collections::BTreeMap;

use crate::core::snapshot::{EntryRef, TreeEntry};
use crate::core::types::{FileMode, Oid};
use crate::git::ObjectStore;

use super::error::GfsError;

pub(crate) type Children = BTreeMap<Vec<u8>, Node>;

/// A file or directory node.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Dir(DirNode),
    File(FileNode),
}

impl Node {
    /// A clean node bound to a stored entry.
    pub(crate) fn from_entry(entry: &EntryRef) -> Self {
        if entry.is_tree() {
            Node::Dir(DirNode::lazy(entry.id.clone()))
        } else {
            Node::File(FileNode::stored(entry.id.clone(), entry.mode))
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        match self {
            Node::Dir(dir) => dir.dirty,
            Node::File(file) => file.dirty,
        }
    }

    pub(crate) fn mode(&self) -> FileMode {
        match self {
            Node::Dir(_) => FileMode::Tree,
            Node::File(file) => file.mode,
        }
    }

    /// The id of this node's content, written to `store` if dirty.
    pub(crate) fn resolve_id<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        persist: bool,
    ) -> Result<Oid, GfsError> {
        match self {
            Node::Dir(dir) => dir.resolve_id(store, persist),
            Node::File(file) => file.resolve_id(store, persist),
        }
    }

    /// A directory that would contribute nothing to its parent's tree.
    fn is_hollow(&self) -> bool {
        match self {
            Node::Dir(dir) => dir.is_hollow(),
            Node::File(_) => false,
        }
    }
}

/// A directory node.
#[derive(Debug, Clone)]
pub(crate) struct DirNode {
    origin: Option<Oid>,
    children: Option<Children>,
    dirty: bool,
}

impl DirNode {
    /// A clean directory whose children load from `tree` on demand.
    pub(crate) fn lazy(tree: Oid) -> Self {
        Self {
            origin: Some(tree),
            children: None,
            dirty: false,
        }
    }

    /// A new directory with no children and no stored counterpart.
    pub(crate) fn empty() -> Self {
        Self {
            origin: None,
            children: Some(Children::new()),
            dirty: true,
        }
    }

    pub(crate) fn origin(&self) -> Option<&Oid> {
        self.origin.as_ref()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The children, loading them from the origin tree first if needed.
    pub(crate) fn children_mut<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> Result<&mut Children, GfsError> {
        if self.children.is_none() {
            let loaded = match &self.origin {
                Some(id) => store
                    .read_tree(id)?
                    .entries()
                    .iter()
                    .map(|entry| (entry.name.clone(), Node::from_entry(&entry.entry_ref())))
                    .collect(),
                None => Children::new(),
            };
            self.children = Some(loaded);
        }
        Ok(self.children.get_or_insert_with(Children::new))
    }

    /// Children of a directory already loaded by [`DirNode::children_mut`].
    pub(crate) fn loaded_children(&mut self) -> &mut Children {
        self.children.get_or_insert_with(Children::new)
    }

    fn is_hollow(&self) -> bool {
        match &self.children {
            Some(children) => children.values().all(Node::is_hollow),
            None => false,
        }
    }

    pub(crate) fn resolve_id<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        persist: bool,
    ) -> Result<Oid, GfsError> {
        if !self.dirty {
            if let Some(id) = &self.origin {
                return Ok(id.clone());
            }
        }
        let Some(children) = self.children.as_mut() else {
            return match &self.origin {
                Some(id) => Ok(id.clone()),
                None => Ok(store.empty_tree()?),
            };
        };

        if persist {
            children.retain(|_, child| !child.is_hollow());
        }
        let mut entries = Vec::with_capacity(children.len());
        for (name, child) in children.iter_mut() {
            if child.is_hollow() {
                continue;
            }
            let mode = child.mode();
            let id = child.resolve_id(store, persist)?;
            entries.push(TreeEntry::new(name.clone(), id, mode));
        }

        let id = store.write_tree(&entries)?;
        if persist {
            self.origin = Some(id.clone());
            self.dirty = false;
        }
        Ok(id)
    }
}

/// A file node: a stored blob with optionally cached bytes, or an edited
/// buffer.
#[derive(Debug, Clone)]
pub(crate) struct FileNode {
    mode: FileMode,
    /// Id of the stored content; cleared once the content is edited
    blob: Option<Oid>,
    /// Cached stored content, or the edited buffer when `blob` is `None`
    bytes: Option<Vec<u8>>,
    dirty: bool,
}

impl FileNode {
    pub(crate) fn stored(blob: Oid, mode: FileMode) -> Self {
        Self {
            mode,
            blob: Some(blob),
            bytes: None,
            dirty: false,
        }
    }

    /// A new file holding `bytes`.
    pub(crate) fn buffer(bytes: Vec<u8>, mode: FileMode) -> Self {
        Self {
            mode,
            blob: None,
            bytes: Some(bytes),
            dirty: true,
        }
    }

    pub(crate) fn mode(&self) -> FileMode {
        self.mode
    }

    /// The stored blob id, if the content has not been edited.
    pub(crate) fn blob(&self) -> Option<&Oid> {
        self.blob.as_ref()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_mode(&mut self, mode: FileMode) {
        if self.mode != mode {
            self.mode = mode;
            self.dirty = true;
        }
    }

    fn load<S: ObjectStore + ?Sized>(&mut self, store: &S) -> Result<(), GfsError> {
        if self.bytes.is_none() {
            if let Some(id) = &self.blob {
                self.bytes = Some(store.read_blob(id)?.into_bytes());
            }
        }
        Ok(())
    }

    /// The file content, read from the store on first use.
    pub(crate) fn content<S: ObjectStore + ?Sized>(&mut self, store: &S) -> Result<&[u8], GfsError> {
        self.load(store)?;
        Ok(self.bytes.as_deref().unwrap_or_default())
    }

    /// The file content as an editable buffer. Marks the file dirty.
    pub(crate) fn content_mut<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> Result<&mut Vec<u8>, GfsError> {
        self.load(store)?;
        self.blob = None;
        self.dirty = true;
        Ok(self.bytes.get_or_insert_with(Vec::new))
    }

    /// Replace the whole content. Marks the file dirty.
    pub(crate) fn replace(&mut self, bytes: Vec<u8>) {
        self.blob = None;
        self.bytes = Some(bytes);
        self.dirty = true;
    }

    pub(crate) fn resolve_id<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        persist: bool,
    ) -> Result<Oid, GfsError> {
        if let Some(id) = &self.blob {
            let id = id.clone();
            if persist {
                self.dirty = false;
            }
            return Ok(id);
        }
        let id = store.write_blob(self.bytes.as_deref().unwrap_or_default())?;
        if persist {
            self.blob = Some(id.clone());
            self.dirty = false;
        }
        Ok(id)
    }
}

/// Render path segments as an absolute path for error messages.
pub(crate) fn display_segments(segments: &[&[u8]]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(&String::from_utf8_lossy(segment));
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Split a slash-separated repository path into segments.
pub(crate) fn split_segments(path: &[u8]) -> Vec<&[u8]> {
    path.split(|&b| b == b'/')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// A mutable borrow of a node found by path.
pub(crate) enum Found<'a> {
    Dir(&'a mut DirNode),
    File(&'a mut FileNode),
}

impl Found<'_> {
    pub(crate) fn to_node(&self) -> Node {
        match self {
            Found::Dir(dir) => Node::Dir((**dir).clone()),
            Found::File(file) => Node::File((**file).clone()),
        }
    }
}

/// The node tree of one file system handle, rooted at a directory.
#[derive(Debug, Clone)]
pub(crate) struct NodeTree {
    root: DirNode,
}

impl NodeTree {
    /// A clean tree over the stored tree `id`.
    pub(crate) fn lazy(id: Oid) -> Self {
        Self {
            root: DirNode::lazy(id),
        }
    }

    /// A tree with nothing in it and no stored counterpart.
    pub(crate) fn empty() -> Self {
        let mut root = DirNode::empty();
        root.dirty = false;
        Self { root }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.root.dirty
    }

    /// The root tree id. With `persist`, every dirty node is written back.
    pub(crate) fn root_id<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        persist: bool,
    ) -> Result<Oid, GfsError> {
        self.root.resolve_id(store, persist)
    }

    /// Discard every change since the last persist or origin update.
    pub(crate) fn reset(&mut self) {
        self.root = match self.root.origin.take() {
            Some(id) => DirNode::lazy(id),
            None => {
                let mut root = DirNode::empty();
                root.dirty = false;
                root
            }
        };
    }

    /// Rebind the whole tree to `tree`, dropping every change.
    pub(crate) fn update_origin(&mut self, tree: Oid) {
        self.root = DirNode::lazy(tree);
    }

    /// Find the node at `segments`. Missing nodes yield `None`; passing
    /// through a file is an error.
    pub(crate) fn find<'a, S: ObjectStore + ?Sized>(
        &'a mut self,
        store: &S,
        segments: &[&[u8]],
    ) -> Result<Option<Found<'a>>, GfsError> {
        if segments.is_empty() {
            return Ok(Some(Found::Dir(&mut self.root)));
        }
        find_in(&mut self.root, store, segments, 0)
    }

    /// Run `f` on the directory at `segments` and mark it and every
    /// ancestor dirty if `f` succeeds.
    pub(crate) fn mutate_dir<S, T, F>(
        &mut self,
        store: &S,
        segments: &[&[u8]],
        f: F,
    ) -> Result<T, GfsError>
    where
        S: ObjectStore + ?Sized,
        F: FnOnce(&mut DirNode) -> Result<T, GfsError>,
    {
        mutate_in(&mut self.root, store, segments, 0, f)
    }

    /// Bind the path to a stored entry, or remove it with `None`.
    ///
    /// Missing directories on the way are created; a file on the way is
    /// replaced by a directory.
    pub(crate) fn set_entry<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        segments: &[&[u8]],
        entry: Option<&EntryRef>,
    ) -> Result<(), GfsError> {
        if segments.is_empty() {
            return Err(GfsError::InvalidArgument(
                "cannot replace the root directory".to_string(),
            ));
        }
        set_in(&mut self.root, store, segments, entry)?;
        Ok(())
    }
}

fn find_in<'a, S: ObjectStore + ?Sized>(
    dir: &'a mut DirNode,
    store: &S,
    segments: &[&[u8]],
    depth: usize,
) -> Result<Option<Found<'a>>, GfsError> {
    let name = segments[depth];
    let Some(child) = dir.children_mut(store)?.get_mut(name) else {
        return Ok(None);
    };
    if depth + 1 == segments.len() {
        return Ok(Some(match child {
            Node::Dir(sub) => Found::Dir(sub),
            Node::File(file) => Found::File(file),
        }));
    }
    match child {
        Node::Dir(sub) => find_in(sub, store, segments, depth + 1),
        Node::File(_) => Err(GfsError::NotADirectory {
            path: display_segments(&segments[..=depth]),
        }),
    }
}

fn mutate_in<S, T, F>(
    dir: &mut DirNode,
    store: &S,
    segments: &[&[u8]],
    depth: usize,
    f: F,
) -> Result<T, GfsError>
where
    S: ObjectStore + ?Sized,
    F: FnOnce(&mut DirNode) -> Result<T, GfsError>,
{
    let children = dir.children_mut(store)?;
    let value = match segments.get(depth) {
        None => f(dir)?,
        Some(name) => match children.get_mut(*name) {
            Some(Node::Dir(sub)) => mutate_in(sub, store, segments, depth + 1, f)?,
            Some(Node::File(_)) => {
                return Err(GfsError::NotADirectory {
                    path: display_segments(&segments[..=depth]),
                })
            }
            None => return Err(GfsError::not_found(display_segments(&segments[..=depth]))),
        },
    };
    dir.dirty = true;
    Ok(value)
}

fn set_in<S: ObjectStore + ?Sized>(
    dir: &mut DirNode,
    store: &S,
    segments: &[&[u8]],
    entry: Option<&EntryRef>,
) -> Result<bool, GfsError> {
    let Some((name, rest)) = segments.split_first() else {
        return Ok(false);
    };
    let children = dir.children_mut(store)?;
    let changed = if rest.is_empty() {
        match entry {
            Some(entry) => {
                children.insert(name.to_vec(), Node::from_entry(entry));
                true
            }
            None => children.remove(*name).is_some(),
        }
    } else {
        if entry.is_none() && !matches!(children.get(*name), Some(Node::Dir(_))) {
            return Ok(false);
        }
        let slot = children
            .entry(name.to_vec())
            .or_insert_with(|| Node::Dir(DirNode::empty()));
        if let Node::File(_) = slot {
            *slot = Node::Dir(DirNode::empty());
        }
        match slot {
            Node::Dir(sub) => set_in(sub, store, rest, entry)?,
            Node::File(_) => false,
        }
    };
    if changed {
        dir.dirty = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MemoryRepo;

    fn blob(repo: &MemoryRepo, text: &str) -> Oid {
        repo.write_blob(text.as_bytes()).unwrap()
    }

    /// `{a.txt, dir/b.txt}`
    fn seeded(repo: &MemoryRepo) -> Oid {
        let inner = repo
            .write_tree(&[TreeEntry::new("b.txt", blob(repo, "b\n"), FileMode::Regular)])
            .unwrap();
        repo.write_tree(&[
            TreeEntry::new("a.txt", blob(repo, "a\n"), FileMode::Regular),
            TreeEntry::new("dir", inner, FileMode::Tree),
        ])
        .unwrap()
    }

    fn write(tree: &mut NodeTree, repo: &MemoryRepo, dir: &[&[u8]], name: &str, text: &str) {
        tree.mutate_dir(repo, dir, |d| {
            d.loaded_children().insert(
                name.as_bytes().to_vec(),
                Node::File(FileNode::buffer(text.as_bytes().to_vec(), FileMode::Regular)),
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn clean_tree_resolves_to_origin_without_writes() {
        let repo = MemoryRepo::new();
        let root = seeded(&repo);
        let mut tree = NodeTree::lazy(root.clone());
        let before = repo.write_count();
        assert_eq!(tree.root_id(&repo, false).unwrap(), root);
        assert_eq!(repo.write_count(), before);
    }

    #[test]
    fn mutation_marks_ancestors_dirty() {
        let repo = MemoryRepo::new();
        let mut tree = NodeTree::lazy(seeded(&repo));
        write(&mut tree, &repo, &[b"dir"], "c.txt", "c\n");
        assert!(tree.is_dirty());
        match tree.find(&repo, &[b"dir"]).unwrap() {
            Some(Found::Dir(dir)) => assert!(dir.is_dirty()),
            _ => panic!("expected a directory"),
        }
        match tree.find(&repo, &[b"a.txt"]).unwrap() {
            Some(Found::File(file)) => assert!(!file.is_dirty()),
            _ => panic!("expected a file"),
        }
    }

    #[test]
    fn persist_then_resolve_writes_nothing() {
        let repo = MemoryRepo::new();
        let mut tree = NodeTree::lazy(seeded(&repo));
        write(&mut tree, &repo, &[], "new.txt", "new\n");
        let persisted = tree.root_id(&repo, true).unwrap();
        assert!(!tree.is_dirty());

        let before = repo.write_count();
        assert_eq!(tree.root_id(&repo, false).unwrap(), persisted);
        assert_eq!(repo.write_count(), before);

        let snapshot = repo.read_tree(&persisted).unwrap();
        assert!(snapshot.get(b"new.txt").is_some());
        assert!(snapshot.get(b"dir").is_some());
    }

    #[test]
    fn identical_content_resolves_to_identical_id() {
        let repo = MemoryRepo::new();
        let root = seeded(&repo);
        let mut tree = NodeTree::lazy(root.clone());
        write(&mut tree, &repo, &[], "a.txt", "a\n");
        assert_eq!(tree.root_id(&repo, false).unwrap(), root);
    }

    #[test]
    fn hollow_directories_are_omitted() {
        let repo = MemoryRepo::new();
        let root = seeded(&repo);
        let mut tree = NodeTree::lazy(root.clone());
        tree.mutate_dir(&repo, &[], |d| {
            d.loaded_children()
                .insert(b"empty".to_vec(), Node::Dir(DirNode::empty()));
            Ok(())
        })
        .unwrap();
        assert_eq!(tree.root_id(&repo, true).unwrap(), root);
        assert!(tree.find(&repo, &[b"empty"]).unwrap().is_none());
    }

    #[test]
    fn empty_root_resolves_to_empty_tree() {
        let repo = MemoryRepo::new();
        let mut tree = NodeTree::empty();
        let id = tree.root_id(&repo, false).unwrap();
        assert_eq!(id, repo.empty_tree().unwrap());
    }

    #[test]
    fn reset_restores_origin() {
        let repo = MemoryRepo::new();
        let root = seeded(&repo);
        let mut tree = NodeTree::lazy(root.clone());
        write(&mut tree, &repo, &[b"dir"], "b.txt", "changed\n");
        tree.reset();
        assert!(!tree.is_dirty());
        assert_eq!(tree.root_id(&repo, false).unwrap(), root);
    }

    #[test]
    fn mutating_through_a_file_fails_cleanly() {
        let repo = MemoryRepo::new();
        let mut tree = NodeTree::lazy(seeded(&repo));
        let err = tree.mutate_dir(&repo, &[b"a.txt"], |_| Ok(())).unwrap_err();
        assert!(matches!(err, GfsError::NotADirectory { ref path } if path == "/a.txt"));
        let err = tree.mutate_dir(&repo, &[b"missing"], |_| Ok(())).unwrap_err();
        assert!(matches!(err, GfsError::NotFound { .. }));
        assert!(!tree.is_dirty());
    }

    #[test]
    fn set_entry_creates_and_removes() {
        let repo = MemoryRepo::new();
        let root = seeded(&repo);
        let mut tree = NodeTree::lazy(root.clone());
        let id = blob(&repo, "deep\n");
        let entry = EntryRef::new(id.clone(), FileMode::Executable);
        tree.set_entry(&repo, &[b"x", b"y", b"z.sh"], Some(&entry)).unwrap();
        match tree.find(&repo, &[b"x", b"y", b"z.sh"]).unwrap() {
            Some(Found::File(file)) => {
                assert_eq!(file.blob(), Some(&id));
                assert_eq!(file.mode(), FileMode::Executable);
            }
            _ => panic!("expected a file"),
        }
        tree.set_entry(&repo, &[b"x", b"y", b"z.sh"], None).unwrap();
        assert_eq!(tree.root_id(&repo, false).unwrap(), root);
    }

    #[test]
    fn set_entry_replaces_file_with_directory() {
        let repo = MemoryRepo::new();
        let mut tree = NodeTree::lazy(seeded(&repo));
        let entry = EntryRef::new(blob(&repo, "x\n"), FileMode::Regular);
        tree.set_entry(&repo, &[b"a.txt", b"inner"], Some(&entry)).unwrap();
        assert!(matches!(
            tree.find(&repo, &[b"a.txt"]).unwrap(),
            Some(Found::Dir(_))
        ));
    }

    #[test]
    fn content_edits_detach_from_stored_blob() {
        let repo = MemoryRepo::new();
        let mut tree = NodeTree::lazy(seeded(&repo));
        let Some(Found::File(file)) = tree.find(&repo, &[b"a.txt"]).unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(file.content(&repo).unwrap(), b"a\n");
        assert!(file.blob().is_some());
        file.content_mut(&repo).unwrap().extend_from_slice(b"more\n");
        assert!(file.blob().is_none());
        assert_eq!(file.content(&repo).unwrap(), b"a\nmore\n");
    }
}
