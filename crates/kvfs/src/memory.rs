//! In-process key-value store.
//!
//! Nothing survives the process; used by tests and as the default backend
//! for embedding the filesystem.

use crate::error::StoreError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }

    fn poisoned() -> StoreError {
        StoreError::unavailable("memory store lock poisoned")
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str, _retry: bool) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        match value {
            Some(bytes) => {
                _ = entries.insert(key.to_string(), bytes);
            }
            None => {
                _ = entries.remove(key);
            }
        }
        Ok(())
    }
}
