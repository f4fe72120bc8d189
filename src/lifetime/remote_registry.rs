//! Table of known remote registries keyed by peer identity.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry<T> {
    pub payload: T,
    pub instance_id: String,
    pub last_activity: DateTime<Utc>,
}

/// What an upsert did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The key was not tracked.
    Added,
    /// The key was tracked under another instance id: the peer restarted.
    Restarted,
    /// Same peer instance; activity refreshed.
    Refreshed,
}

#[derive(Debug)]
pub struct RemoteRegistry<T> {
    entries: RwLock<HashMap<String, RemoteEntry<T>>>,
}

impl<T> Default for RemoteRegistry<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> RemoteRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RemoteEntry<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RemoteEntry<T>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record activity for `key`, storing the latest payload.
    pub fn upsert(&self, key: &str, instance_id: &str, payload: T, now: DateTime<Utc>) -> Upsert {
        let mut entries = self.write();
        match entries.get_mut(key) {
            Some(entry) => {
                let outcome = if entry.instance_id == instance_id {
                    Upsert::Refreshed
                } else {
                    entry.instance_id = instance_id.to_string();
                    Upsert::Restarted
                };
                entry.payload = payload;
                entry.last_activity = now;
                outcome
            }
            None => {
                entries.insert(
                    key.to_string(),
                    RemoteEntry {
                        payload,
                        instance_id: instance_id.to_string(),
                        last_activity: now,
                    },
                );
                Upsert::Added
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<RemoteEntry<T>> {
        self.write().remove(key)
    }

    /// Remove and return every entry last active before `cutoff`.
    pub fn expire(&self, cutoff: DateTime<Utc>) -> Vec<(String, RemoteEntry<T>)> {
        let mut entries = self.write();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.last_activity < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<RemoteEntry<T>> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
