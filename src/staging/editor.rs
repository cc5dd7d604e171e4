//! staging::editor
//!
//! Path-bound edits applied to a [`StagingIndex`](super::StagingIndex).

use crate::core::snapshot::EntryRef;
use crate::core::types::Oid;
use crate::gfs::GfsError;

/// One edit of a staging index.
///
/// Paths are slash-separated and relative to the repository root. They are
/// checked when the edit is built; `.`, `..`, empty names and NUL bytes are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEditor {
    /// Insert a file entry, displacing whatever blocks it.
    AddEntry { path: Vec<u8>, entry: EntryRef },

    /// Same effect as `AddEntry`; names the intent to replace.
    UpdateEntry { path: Vec<u8>, entry: EntryRef },

    /// Remove one file entry. A missing path is not an error.
    DeleteEntry { path: Vec<u8> },

    /// Remove every entry under a directory. The empty path clears the
    /// whole index.
    DeleteTree { path: Vec<u8> },

    /// Graft every entry of a stored tree under a directory.
    AddTree { path: Vec<u8>, tree: Oid },
}

impl CacheEditor {
    pub fn add_entry(path: impl AsRef<[u8]>, entry: EntryRef) -> Result<Self, GfsError> {
        Ok(CacheEditor::AddEntry {
            path: file_path(path.as_ref())?,
            entry,
        })
    }

    pub fn update_entry(path: impl AsRef<[u8]>, entry: EntryRef) -> Result<Self, GfsError> {
        Ok(CacheEditor::UpdateEntry {
            path: file_path(path.as_ref())?,
            entry,
        })
    }

    pub fn delete_entry(path: impl AsRef<[u8]>) -> Result<Self, GfsError> {
        Ok(CacheEditor::DeleteEntry {
            path: file_path(path.as_ref())?,
        })
    }

    pub fn delete_tree(path: impl AsRef<[u8]>) -> Result<Self, GfsError> {
        Ok(CacheEditor::DeleteTree {
            path: clean_path(path.as_ref())?,
        })
    }

    pub fn add_tree(path: impl AsRef<[u8]>, tree: Oid) -> Result<Self, GfsError> {
        Ok(CacheEditor::AddTree {
            path: clean_path(path.as_ref())?,
            tree,
        })
    }

    /// The path this edit is bound to.
    pub fn path(&self) -> &[u8] {
        match self {
            CacheEditor::AddEntry { path, .. }
            | CacheEditor::UpdateEntry { path, .. }
            | CacheEditor::DeleteEntry { path }
            | CacheEditor::DeleteTree { path }
            | CacheEditor::AddTree { path, .. } => path,
        }
    }
}

/// Strip surrounding and repeated slashes and validate every name.
pub(crate) fn clean_path(path: &[u8]) -> Result<Vec<u8>, GfsError> {
    let invalid = |why: &str| {
        GfsError::InvalidArgument(format!(
            "{why} in path {}",
            String::from_utf8_lossy(path)
        ))
    };
    let mut cleaned = Vec::with_capacity(path.len());
    for name in path.split(|&b| b == b'/').filter(|n| !n.is_empty()) {
        if name == b"." || name == b".." {
            return Err(invalid("relative name"));
        }
        if name.contains(&0) {
            return Err(invalid("NUL byte"));
        }
        if !cleaned.is_empty() {
            cleaned.push(b'/');
        }
        cleaned.extend_from_slice(name);
    }
    Ok(cleaned)
}

fn file_path(path: &[u8]) -> Result<Vec<u8>, GfsError> {
    let cleaned = clean_path(path)?;
    if cleaned.is_empty() {
        return Err(GfsError::InvalidArgument(
            "a file entry needs a non-empty path".to_string(),
        ));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_cleaned() {
        assert_eq!(clean_path(b"/a//b/").unwrap(), b"a/b");
        assert_eq!(clean_path(b"").unwrap(), b"");
        assert!(clean_path(b"a/../b").is_err());
        assert!(clean_path(b"a/./b").is_err());
        assert!(clean_path(b"a\0b").is_err());
    }

    #[test]
    fn file_edits_need_a_path() {
        assert!(matches!(
            CacheEditor::delete_entry("/"),
            Err(GfsError::InvalidArgument(_))
        ));
        let edit = CacheEditor::delete_tree("/").unwrap();
        assert_eq!(edit.path(), b"");
    }
}
