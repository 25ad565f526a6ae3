use sled::Db;

use super::StorageEngine;
use crate::Result;

/// A storage engine backed by the `sled` embedded database.
///
/// `sled::Db` is internally `Arc`-based, so cloning is cheap
/// and thread-safe.
#[derive(Clone)]
pub struct SledEngine {
    db: Db,
}

impl SledEngine {
    /// Creates a new `SledEngine` from an already-opened sled `Db`.
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl StorageEngine for SledEngine {
    fn open(path: &str) -> Result<Self> {
        let db = sled::Config::new().path(path).open()?;
        Ok(Self::new(db))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        self.db.flush()?;
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
