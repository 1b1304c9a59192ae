use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::KvStorage;
use crate::error::StoreError;

/// Process-lifetime storage, the analogue of browser session storage.
pub struct MemoryStorage {
    name: String,
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryStorage {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl KvStorage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
