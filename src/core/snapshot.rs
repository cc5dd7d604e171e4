//! core::snapshot
//!
//! Immutable value types for git content.
//!
//! A [`BlobSnapshot`] is the bytes of one file. A [`TreeSnapshot`] is one
//! directory level: entries kept in git's tree order, where a subtree sorts
//! as if its name ended in `/`. Both are produced by reading from an object
//! store and never change afterwards.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::types::{FileMode, Oid};

/// An object id paired with the mode it is referenced under.
///
/// This is what a path "points at" in a tree, and what conflict reports
/// carry for each side of a merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub id: Oid,
    pub mode: FileMode,
}

impl EntryRef {
    pub fn new(id: Oid, mode: FileMode) -> Self {
        Self { id, mode }
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

/// One named entry of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    pub name: Vec<u8>,
    pub id: Oid,
    pub mode: FileMode,
}

impl TreeEntry {
    pub fn new(name: impl Into<Vec<u8>>, id: Oid, mode: FileMode) -> Self {
        Self {
            name: name.into(),
            id,
            mode,
        }
    }

    /// The id and mode without the name.
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef::new(self.id.clone(), self.mode)
    }

    /// The name decoded lossily, for messages and logs.
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Compare two entry names in git tree order.
///
/// Names are compared bytewise; when one is a prefix of the other, the next
/// byte of a tree name is taken to be `/`.
pub fn git_name_order(a: &[u8], a_is_tree: bool, b: &[u8], b_is_tree: bool) -> Ordering {
    let common = a.len().min(b.len());
    match a[..common].cmp(&b[..common]) {
        Ordering::Equal => {}
        other => return other,
    }
    let next = |name: &[u8], is_tree: bool| {
        name.get(common)
            .copied()
            .or(if is_tree { Some(b'/') } else { None })
    };
    next(a, a_is_tree).cmp(&next(b, b_is_tree))
}

/// Sort tree entries in place into git tree order.
pub fn sort_entries(entries: &mut [TreeEntry]) {
    entries.sort_by(|a, b| git_name_order(&a.name, a.mode.is_tree(), &b.name, b.mode.is_tree()));
}

/// Immutable bytes of a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSnapshot {
    id: Oid,
    bytes: Vec<u8>,
}

impl BlobSnapshot {
    pub fn new(id: Oid, bytes: Vec<u8>) -> Self {
        Self { id, bytes }
    }

    pub fn id(&self) -> &Oid {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Immutable, sorted listing of one tree object.
///
/// # Example
///
/// ```
/// use gitvfs::core::snapshot::{TreeEntry, TreeSnapshot};
/// use gitvfs::core::types::{FileMode, Oid};
///
/// let id = Oid::new("a".repeat(40)).unwrap();
/// let tree = TreeSnapshot::new(
///     id.clone(),
///     vec![
///         TreeEntry::new("foo.txt", id.clone(), FileMode::Regular),
///         TreeEntry::new("foo", id.clone(), FileMode::Tree),
///     ],
/// );
/// // "foo/" sorts after "foo.txt" because '.' < '/'
/// let names: Vec<_> = tree.entries().iter().map(|e| e.display_name()).collect();
/// assert_eq!(names, ["foo.txt", "foo"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSnapshot {
    id: Oid,
    entries: Vec<TreeEntry>,
}

impl TreeSnapshot {
    /// Build a snapshot, sorting `entries` into git order.
    pub fn new(id: Oid, mut entries: Vec<TreeEntry>) -> Self {
        sort_entries(&mut entries);
        Self { id, entries }
    }

    pub fn id(&self) -> &Oid {
        &self.id
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// Find an entry by exact name.
    pub fn get(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
