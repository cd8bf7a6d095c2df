//! Process-local cache store used when no Redis endpoint is configured and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::application::ports::{CacheEntry, CacheStore, CacheStoreError};

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of one field, bypassing the [`CacheStore`] interface.
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        self.entries
            .get(key)
            .and_then(|entry| entry.get(field).cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        Ok(self
            .entries
            .get(key)
            .and_then(|entry| CacheEntry::from_fields(entry.value().clone())))
    }

    async fn set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), CacheStoreError> {
        let mut entry = self.entries.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }
}
