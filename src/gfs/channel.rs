//! gfs::channel
//!
//! Byte channels over files in the working tree.
//!
//! A [`FileChannel`] reads and writes the file's node directly: every call
//! locks the node tree, so writes are visible to other readers at once and
//! are written back with the rest of the tree.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::core::path::GfsPath;
use crate::core::types::FileMode;

use super::files::overwrite_at;
use super::node::{FileNode, Found, Node};
use super::{GfsError, GitFileSystem};

/// How to open a file, in the manner of [`std::fs::OpenOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub(crate) read: bool,
    pub(crate) write: bool,
    pub(crate) append: bool,
    pub(crate) truncate: bool,
    pub(crate) create: bool,
    pub(crate) create_new: bool,
}

impl OpenOptions {
    /// All options off. Opening with no access at all means read access.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.write = write;
        self
    }

    /// Every write goes to the end of the file. Implies write access.
    pub fn append(&mut self, append: bool) -> &mut Self {
        self.append = append;
        self
    }

    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.truncate = truncate;
        self
    }

    pub fn create(&mut self, create: bool) -> &mut Self {
        self.create = create;
        self
    }

    /// Create the file, failing if it exists.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.create_new = create_new;
        self
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.write || self.append
    }

    pub(crate) fn is_readable(&self) -> bool {
        self.read || !self.is_writable()
    }

    pub(crate) fn may_create(&self) -> bool {
        self.create || self.create_new
    }

    pub(crate) fn validate(&self) -> Result<(), GfsError> {
        if !self.is_writable() && (self.truncate || self.may_create()) {
            return Err(GfsError::InvalidArgument(
                "create and truncate need write access".to_string(),
            ));
        }
        if self.append && self.truncate {
            return Err(GfsError::InvalidArgument(
                "append and truncate are exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

impl GitFileSystem {
    /// Open a file as a byte channel.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file is missing and `options` do not create it
    /// - `AlreadyExists` with `create_new` over an existing node
    /// - `NotAFile` if the path names a directory
    pub fn open(&self, path: &GfsPath, options: &OpenOptions) -> Result<FileChannel, GfsError> {
        self.ensure_open()?;
        options.validate()?;
        let path = self.locate(path)?;
        let segments: Vec<&[u8]> = path.segments().collect();
        let Some((name, parent)) = segments.split_last() else {
            return Err(GfsError::NotAFile {
                path: path.to_string(),
            });
        };

        let store = self.repo();
        {
            let mut tree = self.lock_tree()?;
            let needs_mutation = match tree.find(store, &segments)? {
                Some(Found::Dir(_)) => {
                    return Err(GfsError::NotAFile {
                        path: path.to_string(),
                    })
                }
                Some(Found::File(_)) if options.create_new => {
                    return Err(GfsError::AlreadyExists {
                        path: path.to_string(),
                    })
                }
                Some(Found::File(_)) => options.truncate,
                None if options.may_create() => true,
                None => return Err(GfsError::not_found(&path)),
            };
            if needs_mutation {
                tree.mutate_dir(store, parent, |dir| {
                    let children = dir.loaded_children();
                    match children.get_mut(*name) {
                        Some(Node::File(file)) => file.replace(Vec::new()),
                        _ => {
                            children.insert(
                                name.to_vec(),
                                Node::File(FileNode::buffer(Vec::new(), FileMode::Regular)),
                            );
                        }
                    }
                    Ok(())
                })?;
            }
        }

        tracing::trace!(%path, ?options, "opened channel");
        Ok(FileChannel {
            gfs: self.clone(),
            path,
            readable: options.is_readable(),
            writable: options.is_writable(),
            append: options.append,
            position: 0,
            open: true,
        })
    }
}

/// An open file in the working tree.
#[derive(Debug)]
pub struct FileChannel {
    gfs: GitFileSystem,
    path: GfsPath,
    readable: bool,
    writable: bool,
    append: bool,
    position: u64,
    open: bool,
}

impl FileChannel {
    pub fn path(&self) -> &GfsPath {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.open && self.gfs.is_open()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Close the channel. Later calls fail with `Closed`.
    pub fn close(&mut self) {
        self.open = false;
    }

    fn ensure_open(&self) -> Result<(), GfsError> {
        if self.open {
            self.gfs.ensure_open()
        } else {
            Err(GfsError::Closed)
        }
    }

    fn with_file<T>(
        &self,
        f: impl FnOnce(&mut FileNode, &dyn crate::git::Repository) -> Result<T, GfsError>,
    ) -> Result<T, GfsError> {
        self.ensure_open()?;
        let store = self.gfs.repo();
        let segments: Vec<&[u8]> = self.path.segments().collect();
        let mut tree = self.gfs.lock_tree()?;
        match tree.find(store, &segments)? {
            Some(Found::File(file)) => f(file, store),
            Some(Found::Dir(_)) => Err(GfsError::NotAFile {
                path: self.path.to_string(),
            }),
            None => Err(GfsError::not_found(&self.path)),
        }
    }

    fn mutate_file<T>(
        &self,
        f: impl FnOnce(&mut FileNode, &dyn crate::git::Repository) -> Result<T, GfsError>,
    ) -> Result<T, GfsError> {
        self.ensure_open()?;
        if !self.writable {
            return Err(GfsError::InvalidArgument(format!(
                "{} is not open for writing",
                self.path
            )));
        }
        let store = self.gfs.repo();
        let segments: Vec<&[u8]> = self.path.segments().collect();
        let Some((name, parent)) = segments.split_last() else {
            return Err(GfsError::NotAFile {
                path: self.path.to_string(),
            });
        };
        let mut tree = self.gfs.lock_tree()?;
        tree.mutate_dir(store, parent, |dir| match dir.loaded_children().get_mut(*name) {
            Some(Node::File(file)) => f(file, store),
            Some(Node::Dir(_)) => Err(GfsError::NotAFile {
                path: self.path.to_string(),
            }),
            None => Err(GfsError::not_found(&self.path)),
        })
    }

    /// Current length of the file.
    pub fn size(&self) -> Result<u64, GfsError> {
        self.with_file(|file, store| Ok(file.content(store)?.len() as u64))
    }

    /// Cut the file down to `size` bytes. Larger sizes leave it unchanged.
    pub fn truncate(&mut self, size: u64) -> Result<(), GfsError> {
        let limit = to_usize(size)?;
        self.mutate_file(|file, store| {
            let content = file.content_mut(store)?;
            if content.len() > limit {
                content.truncate(limit);
            }
            Ok(())
        })?;
        self.position = self.position.min(size);
        Ok(())
    }
}

fn to_usize(value: u64) -> Result<usize, GfsError> {
    usize::try_from(value)
        .map_err(|_| GfsError::InvalidArgument(format!("offset {value} out of range")))
}

impl Read for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not open for reading", self.path),
            ));
        }
        let start = to_usize(self.position)?;
        let count = self.with_file(|file, store| {
            let content = file.content(store)?;
            let start = start.min(content.len());
            let count = buf.len().min(content.len() - start);
            buf[..count].copy_from_slice(&content[start..start + count]);
            Ok(count)
        })?;
        self.position += count as u64;
        Ok(count)
    }
}

impl Write for FileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let position = to_usize(self.position)?;
        let append = self.append;
        let end = self.mutate_file(|file, store| {
            let content = file.content_mut(store)?;
            let offset = if append { content.len() } else { position };
            overwrite_at(content, offset, buf);
            Ok(offset + buf.len())
        })?;
        self.position = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.position = n;
                return Ok(n);
            }
            SeekFrom::End(offset) => (self.size()?, offset),
            SeekFrom::Current(offset) => (self.position, offset),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.position = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
