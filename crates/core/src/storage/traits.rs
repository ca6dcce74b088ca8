//! Object store contract.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::StorageError;

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// SHA-256 of the body, when the backend tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Hex SHA-256 of an object body.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Key/value object storage scoped by key prefixes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &str;

    /// Writes an object, replacing any previous body at the same key.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectInfo, StorageError>;

    /// Reads an object body.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Lists every object whose key starts with `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Deletes the given keys. Absent keys are skipped, not errors.
    ///
    /// Returns the number of objects that actually existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError>;

    /// Copies an object to a local file, creating parent directories.
    async fn download_to(&self, key: &str, path: &Path) -> Result<u64, StorageError> {
        let bytes = self.get(key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        Ok(bytes.len() as u64)
    }

    /// Uploads a local file.
    async fn upload_from(&self, key: &str, path: &Path) -> Result<ObjectInfo, StorageError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        self.put(key, bytes).await
    }
}

/// Serializes `value` as JSON and stores it.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> Result<ObjectInfo, StorageError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.put(key, bytes).await
}

/// Reads and deserializes a JSON object.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<T, StorageError> {
    let bytes = store.get(key).await?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })
}
