use crate::utils::StoreError;

/// Map an area name onto its storage name: `.` and `/` become `_`.
///
/// Existing stores were written with this rule, so it must not change.
pub fn normalize_area(area: &str) -> String {
    area.replace(['.', '/'], "_")
}

/// Area-partitioned key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn set(&self, area: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn get_bytes(&self, area: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key` and return the value it held, in one atomic step.
    fn take_bytes(&self, area: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key`, returning whether it was present.
    fn remove_key(&self, area: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.take_bytes(area, key)?.is_some())
    }

    /// Drop every key of `area`, returning whether the area existed.
    fn remove_area(&self, area: &str) -> Result<bool, StoreError>;

    fn set_string(&self, area: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.set(area, key, value.as_bytes())
    }

    fn get_string(&self, area: &str, key: &str) -> Result<Option<String>, StoreError> {
        self.get_bytes(area, key)?
            .map(String::from_utf8)
            .transpose()
            .map_err(StoreError::from)
    }
}
