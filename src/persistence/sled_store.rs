//! Persistence layer backed by `sled`
//!
//! Each normalized area maps to one `sled` tree; keys are stored as UTF-8
//! bytes.

use std::path::Path;

use sled::Db;
use tracing::debug;

use crate::persistence::store::{KeyValueStore, normalize_area};
use crate::utils::StoreError;

#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Opened sled store");
        Ok(Self { db })
    }

    /// Open a throwaway database that is removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl KeyValueStore for SledStore {
    fn set(&self, area: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let tree = self.db.open_tree(normalize_area(area))?;
        tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn get_bytes(&self, area: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let tree = self.db.open_tree(normalize_area(area))?;
        Ok(tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn take_bytes(&self, area: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let tree = self.db.open_tree(normalize_area(area))?;
        Ok(tree.remove(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn remove_area(&self, area: &str) -> Result<bool, StoreError> {
        Ok(self.db.drop_tree(normalize_area(area))?)
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
