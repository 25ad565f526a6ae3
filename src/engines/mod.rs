use crate::Result;

/// Trait for an embedded key-value storage engine.
///
/// One value of an implementing type is one open database instance.
/// Instances must be cheaply cloneable (via `Arc`) and safe to send across
/// threads: the registry hands clones to request handlers running on a
/// thread pool, and the instance stays usable until the last clone is gone.
pub trait StorageEngine: Clone + Send + 'static {
    /// Opens the database at `path`, creating it if missing.
    fn open(path: &str) -> Result<Self>;

    /// Gets the value of a key.
    ///
    /// Returns `None` if the key does not exist.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Sets the value of a key, overwriting any previous value.
    ///
    /// The write is flushed before this returns.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Looks up a batch of keys in one call.
    ///
    /// The returned vector has one status per key, in request order.
    fn multi_get(&self, keys: &[Vec<u8>]) -> Vec<Result<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Flushes and closes this handle on the instance.
    fn close(self) -> Result<()>;
}

mod sled_engine;

pub use self::sled_engine::SledEngine;
