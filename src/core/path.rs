//! core::path
//!
//! Byte-exact path algebra for the virtual file hierarchy.
//!
//! # Model
//!
//! A [`GfsPath`] is an immutable byte string scoped to one file system
//! session. `/` separates names, a leading `/` makes the path absolute, and
//! the empty path is valid (it names "here" in relative terms). Two paths
//! with identical bytes but different sessions are never equal.
//!
//! Every name-level operation works on raw bytes through a lazily computed
//! table of name offsets; nothing is decoded as text except for display.
//!
//! # Example
//!
//! ```
//! use gitvfs::core::path::GfsPath;
//! use uuid::Uuid;
//!
//! let session = Uuid::new_v4();
//! let base = GfsPath::new(session, "/a/b").unwrap();
//! let other = GfsPath::new(session, "/a/c/d").unwrap();
//!
//! let rel = base.relativize(&other).unwrap();
//! assert_eq!(rel.to_string(), "../c/d");
//! assert_eq!(base.resolve(&rel).normalize(), other);
//! ```

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use thiserror::Error;
use uuid::Uuid;

/// Errors from path construction and path algebra.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path {input:?}: NUL character not allowed")]
    NulCharacter { input: String },

    #[error("name index {index} out of range for a path with {count} names")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("invalid name range {begin}..{end} for a path with {count} names")]
    InvalidRange {
        begin: usize,
        end: usize,
        count: usize,
    },

    #[error("cannot relativize {other} against {base}: only one of them is absolute")]
    MixedAbsoluteness { base: String, other: String },

    #[error("path {path} belongs to a different file system")]
    ForeignPath { path: String },
}

/// A path inside one virtual file system.
#[derive(Clone)]
pub struct GfsPath {
    session: Uuid,
    bytes: Vec<u8>,
    offsets: OnceLock<Vec<usize>>,
}

impl GfsPath {
    /// Parse a textual path, collapsing repeated slashes and dropping a
    /// trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::NulCharacter`] if the input contains a NUL byte.
    pub fn new(session: Uuid, input: &str) -> Result<Self, PathError> {
        Self::parse_bytes(session, input.as_bytes())
    }

    /// Like [`GfsPath::new`] but over raw bytes.
    pub fn parse_bytes(session: Uuid, input: &[u8]) -> Result<Self, PathError> {
        if input.contains(&0) {
            return Err(PathError::NulCharacter {
                input: String::from_utf8_lossy(input).into_owned(),
            });
        }
        let mut bytes = Vec::with_capacity(input.len());
        for &b in input {
            if b == b'/' && bytes.last() == Some(&b'/') {
                continue;
            }
            bytes.push(b);
        }
        if bytes.len() > 1 && bytes.last() == Some(&b'/') {
            bytes.pop();
        }
        Ok(Self::from_clean(session, bytes))
    }

    /// The root path `/` of a session.
    pub fn root_of(session: Uuid) -> Self {
        Self::from_clean(session, b"/".to_vec())
    }

    /// The empty path of a session.
    pub fn empty_of(session: Uuid) -> Self {
        Self::from_clean(session, Vec::new())
    }

    fn from_clean(session: Uuid, bytes: Vec<u8>) -> Self {
        Self {
            session,
            bytes,
            offsets: OnceLock::new(),
        }
    }

    fn sibling(&self, bytes: Vec<u8>) -> Self {
        Self::from_clean(self.session, bytes)
    }

    /// The session this path is bound to.
    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_absolute(&self) -> bool {
        self.bytes.first() == Some(&b'/')
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.bytes == b"/"
    }

    /// Start offset of each name.
    fn offsets(&self) -> &[usize] {
        self.offsets.get_or_init(|| {
            let mut offsets = Vec::new();
            let mut at_start = true;
            for (i, &b) in self.bytes.iter().enumerate() {
                if b == b'/' {
                    at_start = true;
                } else if at_start {
                    offsets.push(i);
                    at_start = false;
                }
            }
            offsets
        })
    }

    /// Byte range of names `begin..end` (exclusive), without separators at
    /// either end.
    fn names_span(&self, begin: usize, end: usize) -> &[u8] {
        let offsets = self.offsets();
        let start = offsets[begin];
        let stop = if end == offsets.len() {
            self.bytes.len()
        } else {
            offsets[end] - 1
        };
        &self.bytes[start..stop]
    }

    pub fn name_count(&self) -> usize {
        self.offsets().len()
    }

    /// Raw bytes of the name at `index`, if in range.
    pub fn name_bytes(&self, index: usize) -> Option<&[u8]> {
        (index < self.name_count()).then(|| self.names_span(index, index + 1))
    }

    /// The name at `index` as a relative single-name path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::IndexOutOfRange`] past the last name.
    pub fn name(&self, index: usize) -> Result<GfsPath, PathError> {
        self.name_bytes(index)
            .map(|name| self.sibling(name.to_vec()))
            .ok_or(PathError::IndexOutOfRange {
                index,
                count: self.name_count(),
            })
    }

    /// Iterate the raw names of this path.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.name_count()).map(move |i| self.names_span(i, i + 1))
    }

    /// Iterate the names of this path as single-name paths.
    pub fn names(&self) -> impl Iterator<Item = GfsPath> + '_ {
        self.segments().map(move |s| self.sibling(s.to_vec()))
    }

    /// Relative path made of names `begin..end`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidRange`] unless `begin <= end <= name_count()`.
    pub fn subpath(&self, begin: usize, end: usize) -> Result<GfsPath, PathError> {
        let count = self.name_count();
        if begin > end || end > count {
            return Err(PathError::InvalidRange { begin, end, count });
        }
        if begin == end {
            return Ok(self.sibling(Vec::new()));
        }
        Ok(self.sibling(self.names_span(begin, end).to_vec()))
    }

    /// The last name, or `None` for the root and the empty path.
    pub fn file_name(&self) -> Option<GfsPath> {
        let count = self.name_count();
        match count {
            0 => None,
            1 if !self.is_absolute() => Some(self.clone()),
            _ => Some(self.sibling(self.names_span(count - 1, count).to_vec())),
        }
    }

    /// The path without its last name.
    ///
    /// `/a` has parent `/`; a single relative name has no parent.
    pub fn parent(&self) -> Option<GfsPath> {
        let last = *self.offsets().last()?;
        match last {
            0 => None,
            1 => Some(self.sibling(b"/".to_vec())),
            _ => Some(self.sibling(self.bytes[..last - 1].to_vec())),
        }
    }

    /// The root of this path's file system.
    pub fn root(&self) -> GfsPath {
        Self::root_of(self.session)
    }

    /// Whether `other` is a name-wise prefix of this path.
    pub fn starts_with(&self, other: &GfsPath) -> bool {
        if self.session != other.session || other.bytes.len() > self.bytes.len() {
            return false;
        }
        let this_count = self.name_count();
        let that_count = other.name_count();

        if that_count == 0 && self.is_absolute() {
            return !other.is_empty();
        }
        if that_count > this_count {
            return false;
        }
        if that_count == this_count && self.bytes.len() != other.bytes.len() {
            return false;
        }
        if self.offsets()[..that_count] != other.offsets()[..that_count] {
            return false;
        }
        if !self.bytes.starts_with(&other.bytes) {
            return false;
        }
        let i = other.bytes.len();
        !(i < self.bytes.len() && self.bytes[i] != b'/')
    }

    /// Whether `other` is a name-wise suffix of this path.
    pub fn ends_with(&self, other: &GfsPath) -> bool {
        let this_len = self.bytes.len();
        let that_len = other.bytes.len();
        if self.session != other.session || that_len > this_len {
            return false;
        }
        if this_len > 0 && that_len == 0 {
            return false;
        }
        if other.is_absolute() && !self.is_absolute() {
            return false;
        }

        let this_count = self.name_count();
        let that_count = other.name_count();
        match that_count.cmp(&this_count) {
            Ordering::Greater => return false,
            Ordering::Equal => {
                if this_count == 0 {
                    return true;
                }
                let mut expected = this_len;
                if self.is_absolute() && !other.is_absolute() {
                    expected -= 1;
                }
                if that_len != expected {
                    return false;
                }
            }
            Ordering::Less => {
                if other.is_absolute() {
                    return false;
                }
            }
        }

        let this_pos = self.offsets()[this_count - that_count];
        let that_pos = other.offsets()[0];
        self.bytes[this_pos..] == other.bytes[that_pos..]
    }

    /// Remove `.` names and `name/..` pairs.
    ///
    /// Pairs are removed in repeated passes until nothing changes. On an
    /// absolute path a `..` with nothing before it is dropped, so the result
    /// never climbs above the root.
    pub fn normalize(&self) -> GfsPath {
        let count = self.name_count();
        if count == 0 {
            return self.clone();
        }
        let absolute = self.is_absolute();
        let names: Vec<&[u8]> = self.segments().collect();
        let mut ignore = vec![false; count];
        let mut remaining = count;
        let mut has_dot_dot = false;

        for (i, name) in names.iter().enumerate() {
            match *name {
                b"." => {
                    ignore[i] = true;
                    remaining -= 1;
                }
                b".." => has_dot_dot = true,
                _ => {}
            }
        }

        if has_dot_dot {
            loop {
                let before = remaining;
                let mut prev: Option<usize> = None;
                for i in 0..count {
                    if ignore[i] {
                        continue;
                    }
                    if names[i] != b".." {
                        prev = Some(i);
                        continue;
                    }
                    if let Some(p) = prev.take() {
                        ignore[p] = true;
                        ignore[i] = true;
                        remaining -= 2;
                    } else if absolute && ignore[..i].iter().all(|&skip| skip) {
                        ignore[i] = true;
                        remaining -= 1;
                    }
                }
                if remaining == before {
                    break;
                }
            }
        }

        if remaining == count {
            return self.clone();
        }
        let mut bytes = Vec::with_capacity(self.bytes.len());
        if absolute {
            bytes.push(b'/');
        }
        let kept = names
            .iter()
            .zip(&ignore)
            .filter_map(|(name, skip)| (!skip).then_some(*name));
        for (n, name) in kept.enumerate() {
            if n > 0 {
                bytes.push(b'/');
            }
            bytes.extend_from_slice(name);
        }
        self.sibling(bytes)
    }

    /// Join `other` onto this path. An absolute `other` replaces this path.
    pub fn resolve(&self, other: &GfsPath) -> GfsPath {
        if other.is_absolute() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return self.sibling(other.bytes.clone());
        }
        let mut bytes = Vec::with_capacity(self.bytes.len() + 1 + other.bytes.len());
        bytes.extend_from_slice(&self.bytes);
        if !self.is_root() {
            bytes.push(b'/');
        }
        bytes.extend_from_slice(&other.bytes);
        self.sibling(bytes)
    }

    /// Parse `other` in this session and resolve it.
    pub fn resolve_str(&self, other: &str) -> Result<GfsPath, PathError> {
        Ok(self.resolve(&GfsPath::new(self.session, other)?))
    }

    /// Resolve `other` against this path's parent.
    pub fn resolve_sibling(&self, other: &GfsPath) -> GfsPath {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// Build the relative path that leads from this path to `other`.
    ///
    /// # Errors
    ///
    /// - [`PathError::ForeignPath`] if `other` belongs to another session
    /// - [`PathError::MixedAbsoluteness`] if only one path is absolute
    pub fn relativize(&self, other: &GfsPath) -> Result<GfsPath, PathError> {
        if self.session != other.session {
            return Err(PathError::ForeignPath {
                path: other.to_string(),
            });
        }
        if self.bytes == other.bytes {
            return Ok(self.sibling(Vec::new()));
        }
        if self.is_absolute() != other.is_absolute() {
            return Err(PathError::MixedAbsoluteness {
                base: self.to_string(),
                other: other.to_string(),
            });
        }
        if self.is_empty() {
            return Ok(other.clone());
        }

        let this_count = self.name_count();
        let that_count = other.name_count();
        let shared = self
            .segments()
            .zip(other.segments())
            .take_while(|(a, b)| a == b)
            .count();

        let mut bytes = Vec::new();
        for n in 0..this_count - shared {
            if n > 0 {
                bytes.push(b'/');
            }
            bytes.extend_from_slice(b"..");
        }
        if shared < that_count {
            if !bytes.is_empty() {
                bytes.push(b'/');
            }
            bytes.extend_from_slice(other.names_span(shared, that_count));
        }
        Ok(self.sibling(bytes))
    }

    /// Resolve against the root if relative.
    pub fn to_absolute(&self) -> GfsPath {
        if self.is_absolute() {
            self.clone()
        } else {
            self.root().resolve(self)
        }
    }
}

impl PartialEq for GfsPath {
    fn eq(&self, other: &Self) -> bool {
        self.session == other.session && self.bytes == other.bytes
    }
}

impl Eq for GfsPath {}

impl Hash for GfsPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session.hash(state);
        self.bytes.hash(state);
    }
}

impl Ord for GfsPath {
    /// Unsigned byte order over the whole path; session breaks ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes
            .cmp(&other.bytes)
            .then_with(|| self.session.cmp(&other.session))
    }
}

impl PartialOrd for GfsPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for GfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

impl std::fmt::Debug for GfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GfsPath({:?})", String::from_utf8_lossy(&self.bytes))
    }
}
