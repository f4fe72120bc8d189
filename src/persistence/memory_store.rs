use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::persistence::store::{KeyValueStore, normalize_area};
use crate::utils::StoreError;

/// In-process store with the same area semantics as [`SledStore`](super::SledStore).
#[derive(Debug, Default)]
pub struct MemoryStore {
    areas: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, area: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.areas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(normalize_area(area))
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_bytes(&self, area: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let areas = self.areas.read().unwrap_or_else(PoisonError::into_inner);
        Ok(areas
            .get(&normalize_area(area))
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn take_bytes(&self, area: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut areas = self.areas.write().unwrap_or_else(PoisonError::into_inner);
        Ok(areas
            .get_mut(&normalize_area(area))
            .and_then(|entries| entries.remove(key)))
    }

    fn remove_area(&self, area: &str) -> Result<bool, StoreError> {
        let mut areas = self.areas.write().unwrap_or_else(PoisonError::into_inner);
        Ok(areas.remove(&normalize_area(area)).is_some())
    }
}
