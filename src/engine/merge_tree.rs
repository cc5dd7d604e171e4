//! engine::merge_tree
//!
//! Three-way merge of trees.
//!
//! For each path, a side that left the base untouched yields to the other
//! side. Directories changed on both sides are merged recursively. Files
//! changed on both sides are settled by the strategy: `ours` and `theirs`
//! pick a side, `recursive` merges lines and records a conflict when that
//! fails. Structural clashes (file against directory, delete against
//! modify) are conflicts under `recursive`; the merged tree keeps our side.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::snapshot::{EntryRef, TreeEntry};
use crate::core::types::{FileMode, MergeStrategy, Oid};
use crate::gfs::GfsError;
use crate::git::ObjectStore;

use super::command::{path_string, Conflict};
use super::merge_file::{self, FileMerge, Labels};

/// A merged tree and the paths that could not be merged cleanly.
#[derive(Debug)]
pub(crate) struct TreeMerge {
    pub(crate) tree: Oid,
    pub(crate) conflicts: BTreeMap<String, Conflict>,
}

/// Settings for one tree merge.
pub(crate) struct TreeMerger<'a, S: ObjectStore + ?Sized> {
    pub(crate) store: &'a S,
    pub(crate) strategy: MergeStrategy,
    pub(crate) labels: Labels<'a>,
    pub(crate) marker_size: usize,
}

impl<S: ObjectStore + ?Sized> TreeMerger<'_, S> {
    pub(crate) fn merge(
        &self,
        base: Option<&Oid>,
        ours: Option<&Oid>,
        theirs: Option<&Oid>,
    ) -> Result<TreeMerge, GfsError> {
        let mut conflicts = BTreeMap::new();
        let entries = self.merge_dir(&[], base, ours, theirs, &mut conflicts)?;
        let tree = self.store.write_tree(&entries)?;
        if !conflicts.is_empty() {
            tracing::warn!(count = conflicts.len(), "merge produced conflicts");
        }
        Ok(TreeMerge { tree, conflicts })
    }

    fn load(&self, tree: Option<&Oid>) -> Result<BTreeMap<Vec<u8>, EntryRef>, GfsError> {
        let Some(id) = tree else {
            return Ok(BTreeMap::new());
        };
        Ok(self
            .store
            .read_tree(id)?
            .entries()
            .iter()
            .map(|entry| (entry.name.clone(), entry.entry_ref()))
            .collect())
    }

    fn read(&self, entry: Option<&EntryRef>) -> Result<Vec<u8>, GfsError> {
        match entry {
            Some(entry) => Ok(self.store.read_blob(&entry.id)?.into_bytes()),
            None => Ok(Vec::new()),
        }
    }

    fn merge_dir(
        &self,
        prefix: &[u8],
        base: Option<&Oid>,
        ours: Option<&Oid>,
        theirs: Option<&Oid>,
        conflicts: &mut BTreeMap<String, Conflict>,
    ) -> Result<Vec<TreeEntry>, GfsError> {
        let bases = self.load(base)?;
        let ourses = self.load(ours)?;
        let theirses = self.load(theirs)?;
        let names: BTreeSet<&Vec<u8>> = bases
            .keys()
            .chain(ourses.keys())
            .chain(theirses.keys())
            .collect();

        let mut entries = Vec::new();
        for name in names {
            let b = bases.get(name);
            let o = ourses.get(name);
            let t = theirses.get(name);
            let mut path = prefix.to_vec();
            if !path.is_empty() {
                path.push(b'/');
            }
            path.extend_from_slice(name);

            let merged = if o == t || b == t {
                o.cloned()
            } else if b == o {
                t.cloned()
            } else {
                self.merge_entry(&path, b, o, t, conflicts)?
            };
            if let Some(entry) = merged {
                entries.push(TreeEntry::new(name.clone(), entry.id, entry.mode));
            }
        }
        Ok(entries)
    }

    /// Merge one path changed differently on both sides.
    fn merge_entry(
        &self,
        path: &[u8],
        b: Option<&EntryRef>,
        o: Option<&EntryRef>,
        t: Option<&EntryRef>,
        conflicts: &mut BTreeMap<String, Conflict>,
    ) -> Result<Option<EntryRef>, GfsError> {
        let tree_of =
            |entry: Option<&EntryRef>| entry.filter(|e| e.is_tree()).map(|e| e.id.clone());

        if let (Some(our_tree), Some(their_tree)) = (tree_of(o), tree_of(t)) {
            let base_tree = tree_of(b);
            let entries = self.merge_dir(
                path,
                base_tree.as_ref(),
                Some(&our_tree),
                Some(&their_tree),
                conflicts,
            )?;
            if entries.is_empty() {
                return Ok(None);
            }
            let id = self.store.write_tree(&entries)?;
            return Ok(Some(EntryRef::new(id, FileMode::Tree)));
        }

        match self.strategy {
            MergeStrategy::Ours => return Ok(o.cloned()),
            MergeStrategy::Theirs => return Ok(t.cloned()),
            MergeStrategy::Recursive => {}
        }

        fn blob_of(entry: Option<&EntryRef>) -> Option<&EntryRef> {
            entry.filter(|e| e.mode.is_blob())
        }
        let (Some(our_blob), Some(their_blob)) = (blob_of(o), blob_of(t)) else {
            self.record(path, b, o, t, conflicts);
            return Ok(o.or(t).cloned());
        };
        let base_blob = blob_of(b);

        let merged = merge_file::merge(
            &self.read(base_blob)?,
            &self.read(Some(our_blob))?,
            &self.read(Some(their_blob))?,
            self.labels,
            self.marker_size,
        );
        let mode = merge_mode(base_blob.map(|e| e.mode), our_blob.mode, their_blob.mode);
        let content = match merged {
            FileMerge::Clean(bytes) => bytes,
            FileMerge::Conflicted(bytes) => {
                self.record(path, b, o, t, conflicts);
                bytes
            }
            FileMerge::Binary => {
                self.record(path, b, o, t, conflicts);
                return Ok(Some(EntryRef::new(our_blob.id.clone(), mode)));
            }
        };
        let id = self.store.write_blob(&content)?;
        Ok(Some(EntryRef::new(id, mode)))
    }

    fn record(
        &self,
        path: &[u8],
        b: Option<&EntryRef>,
        o: Option<&EntryRef>,
        t: Option<&EntryRef>,
        conflicts: &mut BTreeMap<String, Conflict>,
    ) {
        let mut conflict = Conflict::new(path_string(path));
        conflict.base = b.cloned();
        conflict.head = o.cloned();
        conflict.target = t.cloned();
        tracing::warn!(path = %conflict.path, "merge conflict");
        conflicts.insert(conflict.path.clone(), conflict);
    }
}

/// A side that kept the base mode yields to the other.
fn merge_mode(base: Option<FileMode>, ours: FileMode, theirs: FileMode) -> FileMode {
    if base == Some(ours) {
        theirs
    } else {
        ours
    }
}
