// src/storage/file.rs
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::fs;

use super::KeyValueStore;
use crate::error::StorageError;

/// Whether `key` can name a file directly inside the store's directory.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.starts_with('.') && !key.contains(['/', '\\']) && !key.contains("..")
}

/// Stores each key as `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the storage directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::Io {
                op: "create",
                key: root.display().to_string(),
                source,
            })?;
        debug!("Opened ledger storage at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                op: "read",
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        // Write beside the target and rename so readers never see half a file.
        let staging = path.with_extension("json.tmp");
        let io_err = |source: std::io::Error| StorageError::Io {
            op: "write",
            key: key.to_string(),
            source,
        };
        fs::write(&staging, value).await.map_err(io_err)?;
        fs::rename(&staging, &path).await.map_err(io_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                op: "remove",
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_values_as_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("ledger")).await.unwrap();

        store.set("notes-2024-05-01", "[1]").await.unwrap();
        assert!(dir.path().join("ledger/notes-2024-05-01.json").exists());
        assert_eq!(
            store.get("notes-2024-05-01").await.unwrap().as_deref(),
            Some("[1]")
        );

        store.set("notes-2024-05-01", "[2]").await.unwrap();
        assert_eq!(
            store.get("notes-2024-05-01").await.unwrap().as_deref(),
            Some("[2]")
        );
        assert!(!dir.path().join("ledger/notes-2024-05-01.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_keys_read_as_none_and_remove_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert_eq!(store.get("notes-1999-01-01").await.unwrap(), None);
        store.remove("notes-1999-01-01").await.unwrap();
    }

    #[tokio::test]
    async fn refuses_keys_that_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        for key in ["../outside", "a/b", ".hidden", ""] {
            assert!(
                matches!(store.set(key, "[]").await, Err(StorageError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }
}
