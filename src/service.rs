use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::common::{Handle, Request, Response};
use crate::engines::StorageEngine;
use crate::registry::{ConnectionRef, Registry};
use crate::{KvError, Result};

/// Request handlers for Open/Close/Get/Put/MultiGet.
///
/// Clones share one registry behind a single mutex, so handlers may run on
/// any number of threads while registry mutation stays serialized. Open and
/// Close run entirely under the lock, engine open/close included. Reads and
/// writes only hold the lock long enough to resolve the handle; a Close then
/// waits for them before closing the engine.
pub struct KvsService<E: StorageEngine> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: StorageEngine> Clone for KvsService<E> {
    fn clone(&self) -> Self {
        KvsService {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: StorageEngine> KvsService<E> {
    /// Creates a service with an empty registry.
    pub fn new() -> Self {
        KvsService {
            registry: Arc::new(Mutex::new(Registry::new())),
        }
    }

    /// Opens the database at `path`, or shares it if already open.
    pub fn open(&self, path: &str) -> Result<Handle> {
        let mut registry = self.lock();
        registry.check_invariants();
        let result = registry.acquire(path);
        registry.check_invariants();
        result
    }

    /// Drops one reference to `handle`.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let mut registry = self.lock();
        registry.check_invariants();
        let result = registry.release(handle);
        registry.check_invariants();
        result
    }

    /// Gets the value of `key`, or `None` if it is absent.
    pub fn get(&self, handle: Handle, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.resolve(handle)?.with(|engine| engine.get(key))
    }

    /// Sets `key` to `value`.
    pub fn put(&self, handle: Handle, key: &[u8], value: &[u8]) -> Result<()> {
        self.resolve(handle)?.with(|engine| engine.put(key, value))
    }

    /// Looks up every key in one engine call.
    ///
    /// All or nothing: if any key fails, the error lists the position of
    /// every failing key and no values are returned.
    pub fn multi_get(&self, handle: Handle, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        let statuses = self
            .resolve(handle)?
            .with(|engine| Ok(engine.multi_get(keys)))?;
        if statuses.len() != keys.len() {
            return Err(KvError::BatchMismatch {
                expected: keys.len(),
                actual: statuses.len(),
            });
        }

        let mut values = Vec::with_capacity(statuses.len());
        let mut failed = Vec::new();
        let mut message = None;
        for (i, status) in statuses.into_iter().enumerate() {
            match status {
                Ok(value) => values.push(value),
                Err(e) => {
                    failed.push(i);
                    message.get_or_insert_with(|| e.to_string());
                }
            }
        }

        match message {
            None => Ok(values),
            Some(message) => Err(KvError::BatchFailed { failed, message }),
        }
    }

    /// Returns the number of unmatched opens of `handle`, if live.
    pub fn refcount(&self, handle: Handle) -> Option<u64> {
        self.lock().refcount(handle)
    }

    /// Returns the number of live handles.
    pub fn open_handles(&self) -> usize {
        self.lock().len()
    }

    /// Dispatches one request and turns its outcome into a response.
    pub fn handle_request(&self, request: Request) -> Response {
        let result = match request {
            Request::Open { path } => self.open(&path).map(Response::Handle),
            Request::Close { handle } => self.close(handle).map(|()| Response::Done),
            Request::Get { handle, key } => self.get(handle, &key).map(Response::Value),
            Request::Put { handle, key, value } => {
                self.put(handle, &key, &value).map(|()| Response::Done)
            }
            Request::MultiGet { handle, keys } => {
                self.multi_get(handle, &keys).map(Response::Values)
            }
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                if let KvError::InvalidHandle(handle) = e {
                    warn!("Request on invalid handle {}", handle);
                } else {
                    debug!("Request failed: {}", e);
                }
                Response::Err(e.into_remote())
            }
        }
    }

    fn resolve(&self, handle: Handle) -> Result<ConnectionRef<E>> {
        self.lock().resolve(handle)
    }

    /// Locks the registry.
    ///
    /// A poisoned lock means a handler panicked mid-mutation, most likely on
    /// a failed invariant check, so the registry is not trusted again.
    fn lock(&self) -> MutexGuard<'_, Registry<E>> {
        self.registry
            .lock()
            .expect("connection registry poisoned by an earlier failure")
    }
}

impl<E: StorageEngine> Default for KvsService<E> {
    fn default() -> Self {
        Self::new()
    }
}
