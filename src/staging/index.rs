//! staging::index
//!
//! A flat, path-sorted list of file entries, the way git's index holds a
//! tree: one entry per file, directories implied by the paths.

use std::collections::BTreeMap;

use crate::core::snapshot::{EntryRef, TreeEntry};
use crate::core::types::{FileMode, Oid};
use crate::gfs::GfsError;
use crate::git::ObjectStore;

use super::editor::CacheEditor;

/// Flat file entries keyed by slash-separated path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingIndex {
    entries: BTreeMap<Vec<u8>, EntryRef>,
}

impl StagingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every file of the stored tree `tree`.
    pub fn from_tree<S: ObjectStore + ?Sized>(store: &S, tree: &Oid) -> Result<Self, GfsError> {
        let mut index = Self::new();
        index.graft(store, &[], tree)?;
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: impl AsRef<[u8]>) -> Option<&EntryRef> {
        self.entries.get(path.as_ref())
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], &EntryRef)> + '_ {
        self.entries.iter().map(|(path, entry)| (path.as_slice(), entry))
    }

    /// Apply `edits` in order. Later edits win over earlier ones on the
    /// same path.
    pub fn apply<S, I>(&mut self, store: &S, edits: I) -> Result<(), GfsError>
    where
        S: ObjectStore + ?Sized,
        I: IntoIterator<Item = CacheEditor>,
    {
        for edit in edits {
            match edit {
                CacheEditor::AddEntry { path, entry } | CacheEditor::UpdateEntry { path, entry } => {
                    self.insert(path, entry);
                }
                CacheEditor::DeleteEntry { path } => {
                    self.entries.remove(&path);
                }
                CacheEditor::DeleteTree { path } => self.remove_under(&path),
                CacheEditor::AddTree { path, tree } => self.graft(store, &path, &tree)?,
            }
        }
        Ok(())
    }

    /// Insert a file, dropping any file that sits where one of its parent
    /// directories must go, and any directory it replaces.
    fn insert(&mut self, path: Vec<u8>, entry: EntryRef) {
        for (i, _) in path.iter().enumerate().filter(|(_, b)| **b == b'/') {
            self.entries.remove(&path[..i]);
        }
        self.remove_under(&path);
        self.entries.insert(path, entry);
    }

    fn remove_under(&mut self, dir: &[u8]) {
        if dir.is_empty() {
            self.entries.clear();
            return;
        }
        let mut prefix = dir.to_vec();
        prefix.push(b'/');
        let doomed: Vec<Vec<u8>> = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.clone())
            .collect();
        for path in doomed {
            self.entries.remove(&path);
        }
    }

    fn graft<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        prefix: &[u8],
        tree: &Oid,
    ) -> Result<(), GfsError> {
        for entry in store.read_tree(tree)?.into_entries() {
            let mut path = prefix.to_vec();
            if !path.is_empty() {
                path.push(b'/');
            }
            path.extend_from_slice(&entry.name);
            if entry.mode.is_tree() {
                self.graft(store, &path, &entry.id)?;
            } else {
                self.insert(path, EntryRef::new(entry.id, entry.mode));
            }
        }
        Ok(())
    }

    /// Write the nested trees the entries describe and return the root.
    pub fn write_tree<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<Oid, GfsError> {
        let mut root = Level::default();
        for (path, entry) in &self.entries {
            let mut names = path.split(|&b| b == b'/').peekable();
            let mut level = &mut root;
            while let Some(name) = names.next() {
                if names.peek().is_none() {
                    level.files.insert(name.to_vec(), entry.clone());
                } else {
                    level = level.dirs.entry(name.to_vec()).or_default();
                }
            }
        }
        root.write(store)
    }
}

/// One directory while the nested trees are built.
#[derive(Default)]
struct Level {
    files: BTreeMap<Vec<u8>, EntryRef>,
    dirs: BTreeMap<Vec<u8>, Level>,
}

impl Level {
    fn write<S: ObjectStore + ?Sized>(&self, store: &S) -> Result<Oid, GfsError> {
        let mut entries = Vec::with_capacity(self.files.len() + self.dirs.len());
        for (name, dir) in &self.dirs {
            entries.push(TreeEntry::new(name.clone(), dir.write(store)?, FileMode::Tree));
        }
        for (name, file) in &self.files {
            entries.push(TreeEntry::new(name.clone(), file.id.clone(), file.mode));
        }
        Ok(store.write_tree(&entries)?)
    }
}
