//! In-memory object store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::error::StorageError;
use super::traits::{content_hash, ObjectInfo, ObjectStore};

struct StoredObject {
    info: ObjectInfo,
    bytes: Vec<u8>,
}

/// Object store kept entirely in process memory.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// All stored keys in order.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectInfo, StorageError> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key, "empty key"));
        }
        let info = ObjectInfo {
            key: key.to_string(),
            size: bytes.len() as u64,
            last_modified: Utc::now(),
            etag: Some(content_hash(&bytes)),
        };
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                info: info.clone(),
                bytes,
            },
        );
        Ok(info)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, o)| o.info.clone())
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError> {
        let mut objects = self.objects.write().await;
        Ok(keys.iter().filter(|k| objects.remove(*k).is_some()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list() {
        let store = InMemoryObjectStore::new();
        store.put("renders/a/x", b"1".to_vec()).await.unwrap();
        store.put("renders/a/y", b"22".to_vec()).await.unwrap();
        store.put("renders/b/z", b"333".to_vec()).await.unwrap();

        let listed = store.list("renders/a/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["renders/a/x", "renders/a/y"]);
        assert_eq!(listed[1].size, 2);
        assert_eq!(store.get("renders/b/z").await.unwrap(), b"333");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryObjectStore::new();
        store.put("k", b"v".to_vec()).await.unwrap();
        let keys = vec!["k".to_string(), "missing".to_string()];

        assert_eq!(store.delete(&keys).await.unwrap(), 1);
        assert_eq!(store.delete(&keys).await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = InMemoryObjectStore::new();
        let value = serde_json::json!({"frames": 100});
        crate::storage::put_json(&store, "meta.json", &value)
            .await
            .unwrap();
        let back: serde_json::Value = crate::storage::get_json(&store, "meta.json")
            .await
            .unwrap();
        assert_eq!(back, value);
    }
}
