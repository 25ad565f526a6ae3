use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{info, warn};

use crate::common::Handle;
use crate::engines::StorageEngine;
use crate::{KvError, Result};

/// Shared slot holding a live engine instance. Emptied when the instance is
/// closed.
type Slot<E> = Arc<RwLock<Option<E>>>;

/// One open database shared by every handle reference to its path.
struct Connection<E> {
    engine: Slot<E>,
    /// Opens not yet matched by a close. Always at least 1 while stored.
    refcount: u64,
}

/// A resolved handle, usable after the registry lock is released.
///
/// Engine calls made through [`ConnectionRef::with`] hold the connection's
/// read lock, and closing the connection takes its write lock, so the engine
/// is never closed under a running call. Once closed, the reference fails
/// with `InvalidHandle`.
pub struct ConnectionRef<E> {
    handle: Handle,
    engine: Slot<E>,
}

impl<E: StorageEngine> ConnectionRef<E> {
    /// Runs `f` against the engine instance, if it is still open.
    pub fn with<T>(&self, f: impl FnOnce(&E) -> Result<T>) -> Result<T> {
        let guard = self.engine.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(engine) => f(engine),
            None => Err(KvError::InvalidHandle(self.handle)),
        }
    }
}

/// Registry of open databases, keyed both by path and by handle.
///
/// Opening a path that is already open shares the existing engine instance
/// and bumps its reference count; the instance is closed when the last
/// reference is released. Handles come from a counter that only grows, so a
/// handle is never reissued, not even for a reopened path.
///
/// The registry itself is not synchronized; callers serialize mutation.
pub struct Registry<E: StorageEngine> {
    handles: HashMap<String, Handle>,
    paths: HashMap<Handle, String>,
    connections: HashMap<Handle, Connection<E>>,
    next_handle: u64,
}

impl<E: StorageEngine> Registry<E> {
    /// Creates an empty registry whose first handle will be 0.
    pub fn new() -> Self {
        Registry {
            handles: HashMap::new(),
            paths: HashMap::new(),
            connections: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Returns the handle for `path`, opening the database if no handle
    /// references it yet.
    ///
    /// If the engine fails to open, the registry is left untouched and no
    /// handle value is consumed.
    ///
    /// # Panics
    ///
    /// Panics if `path` maps to a handle with no connection record.
    pub fn acquire(&mut self, path: &str) -> Result<Handle> {
        if let Some(&handle) = self.handles.get(path) {
            let conn = self
                .connections
                .get_mut(&handle)
                .unwrap_or_else(|| panic!("handle {handle} for {path} has no connection"));
            conn.refcount += 1;
            return Ok(handle);
        }

        let handle = Handle::new(self.next_handle);
        let engine = E::open(path)?;
        self.next_handle += 1;

        self.handles.insert(path.to_owned(), handle);
        self.paths.insert(handle, path.to_owned());
        self.connections.insert(
            handle,
            Connection {
                engine: Arc::new(RwLock::new(Some(engine))),
                refcount: 1,
            },
        );
        info!("Opened {} as handle {}", path, handle);
        Ok(handle)
    }

    /// Drops one reference to `handle`, closing the database when it was the
    /// last one.
    ///
    /// Closing waits for engine calls still running through a
    /// [`ConnectionRef`], so the instance is fully released on return and the
    /// path can be opened again at once.
    ///
    /// Fails only if `handle` is not live. Errors from closing the engine are
    /// logged, not returned: the handle is gone either way.
    pub fn release(&mut self, handle: Handle) -> Result<()> {
        let conn = self
            .connections
            .get_mut(&handle)
            .ok_or(KvError::InvalidHandle(handle))?;
        conn.refcount -= 1;
        if conn.refcount > 0 {
            return Ok(());
        }

        let conn = self
            .connections
            .remove(&handle)
            .unwrap_or_else(|| panic!("handle {handle} vanished during release"));
        let path = self
            .paths
            .remove(&handle)
            .unwrap_or_else(|| panic!("handle {handle} has a connection but no path"));
        self.handles.remove(&path);

        let engine = conn
            .engine
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(Err(e)) = engine.map(E::close) {
            warn!("Error closing {} (handle {}): {}", path, handle, e);
        }
        info!("Closed {} (handle {})", path, handle);
        Ok(())
    }

    /// Returns a reference to the connection behind `handle` without
    /// touching its reference count.
    pub fn resolve(&self, handle: Handle) -> Result<ConnectionRef<E>> {
        self.connections
            .get(&handle)
            .map(|conn| ConnectionRef {
                handle,
                engine: Arc::clone(&conn.engine),
            })
            .ok_or(KvError::InvalidHandle(handle))
    }

    /// Returns the number of unmatched opens of `handle`, if live.
    pub fn refcount(&self, handle: Handle) -> Option<u64> {
        self.connections.get(&handle).map(|conn| conn.refcount)
    }

    /// Returns the path `handle` was opened with, if live.
    pub fn path_of(&self, handle: Handle) -> Option<&str> {
        self.paths.get(&handle).map(String::as_str)
    }

    /// Returns the number of live handles.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no handle is live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Asserts that the path map, handle map and connection map describe the
    /// same set of connections.
    ///
    /// # Panics
    ///
    /// Panics if the registry is inconsistent. Nothing the registry does
    /// afterwards could be trusted, so there is no recovery path.
    pub fn check_invariants(&self) {
        assert_eq!(self.handles.len(), self.paths.len(), "path and handle maps differ in size");
        assert_eq!(
            self.paths.len(),
            self.connections.len(),
            "handle map and connections differ in size"
        );
        for (path, handle) in &self.handles {
            assert_eq!(
                self.paths.get(handle).map(String::as_str),
                Some(path.as_str()),
                "handle {handle} does not map back to {path}"
            );
            assert!(
                self.connections.contains_key(handle),
                "handle {handle} has no connection"
            );
        }
        for (handle, conn) in &self.connections {
            assert!(
                handle.get() < self.next_handle,
                "handle {handle} was never allocated"
            );
            assert!(conn.refcount > 0, "handle {handle} is live with refcount 0");
        }
    }
}

impl<E: StorageEngine> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}
