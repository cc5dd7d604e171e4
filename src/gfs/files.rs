//! gfs::files
//!
//! File and directory operations on a handle's working tree.
//!
//! Every operation locks only the node tree. Paths may be relative; they
//! resolve against the root and are normalized first.

use chrono::{DateTime, Utc};

use crate::core::path::GfsPath;
use crate::core::types::{FileMode, Oid};

use super::channel::OpenOptions;
use super::node::{display_segments, DirNode, FileNode, Found, Node};
use super::{GfsError, GitFileSystem};

/// What a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Attributes of a file or directory.
///
/// Timestamps are not tracked; every time reads as the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    kind: NodeKind,
    size: u64,
    mode: FileMode,
    object_id: Option<Oid>,
    dirty: bool,
}

impl Metadata {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Content length in bytes; zero for directories.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn is_executable(&self) -> bool {
        self.mode == FileMode::Executable
    }

    pub fn is_symlink(&self) -> bool {
        self.mode == FileMode::Symlink
    }

    /// The stored object id, if the node is unchanged since it was loaded
    /// or last written back.
    pub fn object_id(&self) -> Option<&Oid> {
        self.object_id.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn modified(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn created(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn accessed(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }
}

impl GitFileSystem {
    fn found_kind(&self, path: &GfsPath) -> Result<Option<NodeKind>, GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let mut tree = self.lock_tree()?;
        let kind = match tree.find(self.repo(), &segments) {
            Ok(Some(Found::Dir(_))) => Some(NodeKind::Directory),
            Ok(Some(Found::File(_))) => Some(NodeKind::File),
            Ok(None) | Err(GfsError::NotADirectory { .. }) => None,
            Err(err) => return Err(err),
        };
        Ok(kind)
    }

    pub fn exists(&self, path: &GfsPath) -> Result<bool, GfsError> {
        Ok(self.found_kind(path)?.is_some())
    }

    pub fn is_directory(&self, path: &GfsPath) -> Result<bool, GfsError> {
        Ok(self.found_kind(path)? == Some(NodeKind::Directory))
    }

    pub fn is_file(&self, path: &GfsPath) -> Result<bool, GfsError> {
        Ok(self.found_kind(path)? == Some(NodeKind::File))
    }

    pub fn metadata(&self, path: &GfsPath) -> Result<Metadata, GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let store = self.repo();
        let mut tree = self.lock_tree()?;
        match tree.find(store, &segments)? {
            Some(Found::Dir(dir)) => Ok(Metadata {
                kind: NodeKind::Directory,
                size: 0,
                mode: FileMode::Tree,
                object_id: if dir.is_dirty() { None } else { dir.origin().cloned() },
                dirty: dir.is_dirty(),
            }),
            Some(Found::File(file)) => {
                let size = file.content(store)?.len() as u64;
                Ok(Metadata {
                    kind: NodeKind::File,
                    size,
                    mode: file.mode(),
                    object_id: if file.is_dirty() { None } else { file.blob().cloned() },
                    dirty: file.is_dirty(),
                })
            }
            None => Err(GfsError::not_found(&path)),
        }
    }

    /// The whole content of a file.
    pub fn read(&self, path: &GfsPath) -> Result<Vec<u8>, GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let store = self.repo();
        let mut tree = self.lock_tree()?;
        match tree.find(store, &segments)? {
            Some(Found::File(file)) => Ok(file.content(store)?.to_vec()),
            Some(Found::Dir(_)) => Err(GfsError::NotAFile {
                path: path.to_string(),
            }),
            None => Err(GfsError::not_found(&path)),
        }
    }

    pub fn read_to_string(&self, path: &GfsPath) -> Result<String, GfsError> {
        String::from_utf8(self.read(path)?)
            .map_err(|_| GfsError::InvalidArgument(format!("{path} is not valid UTF-8")))
    }

    /// Create or replace a file with `bytes`.
    pub fn write(&self, path: &GfsPath, bytes: &[u8]) -> Result<(), GfsError> {
        self.write_with(
            path,
            bytes,
            OpenOptions::new().write(true).create(true).truncate(true),
        )
    }

    /// Write `bytes` to a file following `options`.
    ///
    /// Without `truncate` or `append`, the bytes overwrite the start of the
    /// existing content.
    pub fn write_with(
        &self,
        path: &GfsPath,
        bytes: &[u8],
        options: &OpenOptions,
    ) -> Result<(), GfsError> {
        self.ensure_open()?;
        options.validate()?;
        if !options.is_writable() {
            return Err(GfsError::InvalidArgument(
                "write needs write or append access".to_string(),
            ));
        }
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let Some((name, parent)) = segments.split_last() else {
            return Err(GfsError::NotAFile {
                path: path.to_string(),
            });
        };
        let store = self.repo();
        let mut tree = self.lock_tree()?;
        tree.mutate_dir(store, parent, |dir| {
            let children = dir.loaded_children();
            match children.get_mut(*name) {
                Some(Node::Dir(_)) => Err(GfsError::NotAFile {
                    path: path.to_string(),
                }),
                Some(Node::File(_)) if options.create_new => Err(GfsError::AlreadyExists {
                    path: path.to_string(),
                }),
                Some(Node::File(file)) => {
                    if options.append {
                        file.content_mut(store)?.extend_from_slice(bytes);
                    } else if options.truncate {
                        file.replace(bytes.to_vec());
                    } else {
                        overwrite_at(file.content_mut(store)?, 0, bytes);
                    }
                    Ok(())
                }
                None if options.may_create() => {
                    children.insert(
                        name.to_vec(),
                        Node::File(FileNode::buffer(bytes.to_vec(), FileMode::Regular)),
                    );
                    Ok(())
                }
                None => Err(GfsError::not_found(&path)),
            }
        })
    }

    /// Create one directory. Its parent must exist.
    pub fn create_directory(&self, path: &GfsPath) -> Result<(), GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let Some((name, parent)) = segments.split_last() else {
            return Err(GfsError::AlreadyExists {
                path: path.to_string(),
            });
        };
        let mut tree = self.lock_tree()?;
        tree.mutate_dir(self.repo(), parent, |dir| {
            let children = dir.loaded_children();
            if children.contains_key(*name) {
                return Err(GfsError::AlreadyExists {
                    path: path.to_string(),
                });
            }
            children.insert(name.to_vec(), Node::Dir(DirNode::empty()));
            Ok(())
        })
    }

    /// Create a directory and any missing ancestors. Existing directories
    /// are left alone.
    pub fn create_directories(&self, path: &GfsPath) -> Result<(), GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let store = self.repo();
        let mut tree = self.lock_tree()?;
        for depth in 1..=segments.len() {
            let exists = match tree.find(store, &segments[..depth])? {
                Some(Found::Dir(_)) => true,
                Some(Found::File(_)) => {
                    return Err(GfsError::NotADirectory {
                        path: display_segments(&segments[..depth]),
                    })
                }
                None => false,
            };
            if !exists {
                let name = segments[depth - 1];
                tree.mutate_dir(store, &segments[..depth - 1], |dir| {
                    dir.loaded_children()
                        .insert(name.to_vec(), Node::Dir(DirNode::empty()));
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    /// Delete a file or an empty directory.
    pub fn delete(&self, path: &GfsPath) -> Result<(), GfsError> {
        self.remove(path, false)
    }

    /// Delete a file or a directory with everything beneath it.
    pub fn delete_recursive(&self, path: &GfsPath) -> Result<(), GfsError> {
        self.remove(path, true)
    }

    fn remove(&self, path: &GfsPath, recursive: bool) -> Result<(), GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let Some((name, parent)) = segments.split_last() else {
            return Err(GfsError::InvalidArgument(
                "cannot delete the root directory".to_string(),
            ));
        };
        let store = self.repo();
        let mut tree = self.lock_tree()?;
        tree.mutate_dir(store, parent, |dir| {
            let children = dir.loaded_children();
            let removable = match children.get_mut(*name) {
                None => return Err(GfsError::not_found(&path)),
                Some(Node::File(_)) => true,
                Some(Node::Dir(sub)) => recursive || sub.children_mut(store)?.is_empty(),
            };
            if !removable {
                return Err(GfsError::DirectoryNotEmpty {
                    path: path.to_string(),
                });
            }
            children.remove(*name);
            Ok(())
        })
    }

    /// Copy a file or a whole directory. With `replace`, an existing target
    /// is overwritten.
    pub fn copy(&self, source: &GfsPath, target: &GfsPath, replace: bool) -> Result<(), GfsError> {
        self.transfer(source, target, replace, false)
    }

    /// Move a file or a whole directory. With `replace`, an existing target
    /// is overwritten.
    pub fn move_path(
        &self,
        source: &GfsPath,
        target: &GfsPath,
        replace: bool,
    ) -> Result<(), GfsError> {
        self.transfer(source, target, replace, true)
    }

    fn transfer(
        &self,
        source: &GfsPath,
        target: &GfsPath,
        replace: bool,
        remove_source: bool,
    ) -> Result<(), GfsError> {
        self.ensure_open()?;
        let source = self.locate(source)?;
        let target = self.locate(target)?;
        if source == target {
            return Ok(());
        }
        let src: Vec<&[u8]> = source.segments().collect();
        let dst: Vec<&[u8]> = target.segments().collect();
        let Some((dst_name, dst_parent)) = dst.split_last() else {
            return Err(GfsError::AlreadyExists {
                path: target.to_string(),
            });
        };
        if src.is_empty() || target.starts_with(&source) {
            return Err(GfsError::InvalidArgument(format!(
                "cannot place {source} inside itself at {target}"
            )));
        }

        let store = self.repo();
        let mut tree = self.lock_tree()?;
        let node = match tree.find(store, &src)? {
            Some(found) => found.to_node(),
            None => return Err(GfsError::not_found(&source)),
        };
        match tree.find(store, dst_parent)? {
            Some(Found::Dir(dir)) => {
                if !replace && dir.children_mut(store)?.contains_key(*dst_name) {
                    return Err(GfsError::AlreadyExists {
                        path: target.to_string(),
                    });
                }
            }
            Some(Found::File(_)) => {
                return Err(GfsError::NotADirectory {
                    path: display_segments(dst_parent),
                })
            }
            None => return Err(GfsError::not_found(display_segments(dst_parent))),
        }

        if remove_source {
            if let Some((src_name, src_parent)) = src.split_last() {
                tree.mutate_dir(store, src_parent, |dir| {
                    dir.loaded_children().remove(*src_name);
                    Ok(())
                })?;
            }
        }
        tree.mutate_dir(store, dst_parent, |dir| {
            dir.loaded_children().insert(dst_name.to_vec(), node);
            Ok(())
        })?;
        tracing::trace!(%source, %target, moved = remove_source, "transferred");
        Ok(())
    }

    /// The entries of a directory, in byte order of their names.
    pub fn list_directory(&self, path: &GfsPath) -> Result<Vec<GfsPath>, GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let store = self.repo();
        let mut tree = self.lock_tree()?;
        match tree.find(store, &segments)? {
            Some(Found::Dir(dir)) => dir
                .children_mut(store)?
                .keys()
                .map(|name| -> Result<GfsPath, GfsError> {
                    let child = GfsPath::parse_bytes(path.session(), name)?;
                    Ok(path.resolve(&child))
                })
                .collect(),
            Some(Found::File(_)) => Err(GfsError::NotADirectory {
                path: path.to_string(),
            }),
            None => Err(GfsError::not_found(&path)),
        }
    }

    /// Set or clear the executable bit of a file.
    pub fn set_executable(&self, path: &GfsPath, executable: bool) -> Result<(), GfsError> {
        self.update_file(path, |file| {
            match (executable, file.mode()) {
                (true, FileMode::Regular) => file.set_mode(FileMode::Executable),
                (false, FileMode::Executable) => file.set_mode(FileMode::Regular),
                _ => {}
            }
            Ok(())
        })
    }

    /// Set the mode of a file: regular, executable, or symlink.
    pub fn set_mode(&self, path: &GfsPath, mode: FileMode) -> Result<(), GfsError> {
        if !matches!(
            mode,
            FileMode::Regular | FileMode::Executable | FileMode::Symlink
        ) {
            return Err(GfsError::InvalidArgument(format!(
                "mode {:o} cannot be set on a file",
                mode.to_value()
            )));
        }
        self.update_file(path, |file| {
            file.set_mode(mode);
            Ok(())
        })
    }

    fn update_file(
        &self,
        path: &GfsPath,
        f: impl FnOnce(&mut FileNode) -> Result<(), GfsError>,
    ) -> Result<(), GfsError> {
        self.ensure_open()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let Some((name, parent)) = segments.split_last() else {
            return Err(GfsError::NotAFile {
                path: path.to_string(),
            });
        };
        let mut tree = self.lock_tree()?;
        tree.mutate_dir(self.repo(), parent, |dir| match dir.loaded_children().get_mut(*name) {
            Some(Node::File(file)) => f(file),
            Some(Node::Dir(_)) => Err(GfsError::NotAFile {
                path: path.to_string(),
            }),
            None => Err(GfsError::not_found(&path)),
        })
    }
}

/// Write `bytes` into `buffer` at `offset`, zero-filling any gap and
/// growing the buffer as needed.
pub(crate) fn overwrite_at(buffer: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if buffer.len() < offset {
        buffer.resize(offset, 0);
    }
    let overlap = bytes.len().min(buffer.len() - offset);
    buffer[offset..offset + overlap].copy_from_slice(&bytes[..overlap]);
    buffer.extend_from_slice(&bytes[overlap..]);
}
