// src/storage/mod.rs
//! Key-value storage backends for day ledgers.
//!
//! The ledger only needs string get/set/remove by key, the same surface a
//! device key-value store offers. Two backends are provided: one JSON file
//! per key on disk, and an in-memory map.

mod file;

pub use file::{is_valid_key, FileStore};

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Raw value under `key`, or `None` if nothing is stored.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the value under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store, mainly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
