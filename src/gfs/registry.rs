//! gfs::registry
//!
//! Process-wide lookup of open file system handles by session id.
//!
//! Handles register when opened and unregister when closed or dropped.
//! The registry holds weak references only, so it never keeps a handle
//! alive.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use uuid::Uuid;

use super::{GitFileSystem, Inner};

type Sessions = RwLock<HashMap<Uuid, Weak<Inner>>>;

static SESSIONS: OnceLock<Sessions> = OnceLock::new();

fn sessions() -> &'static Sessions {
    SESSIONS.get_or_init(|| RwLock::new(HashMap::new()))
}

pub(crate) fn register(session: Uuid, inner: Weak<Inner>) {
    if let Ok(mut map) = sessions().write() {
        map.insert(session, inner);
    }
}

pub(crate) fn unregister(session: Uuid) {
    if let Ok(mut map) = sessions().write() {
        map.remove(&session);
    }
}

/// The open handle for `session`, if there is one.
pub fn lookup(session: Uuid) -> Option<GitFileSystem> {
    // Upgrade outside the lock: dropping the last strong reference
    // unregisters, which takes the write lock.
    let weak = sessions().read().ok()?.get(&session).cloned()?;
    let inner: Arc<Inner> = weak.upgrade()?;
    let gfs = GitFileSystem::from_inner(inner);
    gfs.is_open().then_some(gfs)
}

/// Session ids of every registered handle.
pub fn open_sessions() -> Vec<Uuid> {
    sessions()
        .read()
        .map(|map| map.keys().copied().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfs::GfsBuilder;
    use crate::git::MemoryRepo;

    #[test]
    fn open_handles_are_found() {
        let gfs = GfsBuilder::new(Arc::new(MemoryRepo::new())).open().unwrap();
        let session = gfs.session();
        assert!(open_sessions().contains(&session));
        let found = lookup(session).unwrap();
        assert_eq!(found.session(), session);
    }

    #[test]
    fn closed_handles_are_gone() {
        let gfs = GfsBuilder::new(Arc::new(MemoryRepo::new())).open().unwrap();
        let session = gfs.session();
        gfs.close().unwrap();
        assert!(lookup(session).is_none());
        assert!(!open_sessions().contains(&session));
    }

    #[test]
    fn dropped_handles_are_gone() {
        let gfs = GfsBuilder::new(Arc::new(MemoryRepo::new())).open().unwrap();
        let session = gfs.session();
        drop(gfs);
        assert!(lookup(session).is_none());
    }

    #[test]
    fn unknown_sessions_are_none() {
        assert!(lookup(Uuid::from_u128(42)).is_none());
    }
}
