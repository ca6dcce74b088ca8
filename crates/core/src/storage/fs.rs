//! Filesystem-backed object store.
//!
//! Keys map onto relative paths under a root directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use super::error::StorageError;
use super::traits::{content_hash, ObjectInfo, ObjectStore};

/// File-name prefix of in-flight writes. Never a valid key component.
const PARTIAL_PREFIX: &str = ".partial-";

/// Object store rooted at a local directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key, "empty key"));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(part)
                    if part.to_string_lossy().starts_with(PARTIAL_PREFIX) =>
                {
                    return Err(StorageError::invalid_key(
                        key,
                        "uses a name reserved for in-flight writes",
                    ))
                }
                Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::invalid_key(
                        key,
                        "must be a relative path without '..'",
                    ))
                }
            }
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    async fn info_for(&self, key: String, path: &Path) -> Result<ObjectInfo, StorageError> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        let last_modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(ObjectInfo {
            key,
            size: meta.len(),
            last_modified,
            etag: None,
        })
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectInfo, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        // Write to a hidden sibling, then rename; listings skip the sibling.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(
            "{}{}-{}",
            PARTIAL_PREFIX,
            uuid::Uuid::new_v4().simple(),
            file_name
        ));
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        let mut info = self.info_for(key.to_string(), &path).await?;
        info.etag = Some(content_hash(&bytes));
        Ok(info)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(key))
            }
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        // Only the directory the prefix names needs walking.
        let start = match prefix.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => self.path_for(dir)?,
            _ => self.root.clone(),
        };
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&dir, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&dir, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(PARTIAL_PREFIX)
                {
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    objects.push(self.info_for(key, &path).await?);
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for key in keys {
            let path = self.path_for(key)?;
            match fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(key = %key, "Object already absent");
                }
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_list_nested_keys() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .put("renders/j1/chunks/chunk-00000000.video", b"abc".to_vec())
            .await
            .unwrap();
        store
            .put("renders/j1/pre-render-metadata.json", b"{}".to_vec())
            .await
            .unwrap();
        store.put("renders/j2/out.mp4", b"x".to_vec()).await.unwrap();

        let listed = store.list("renders/j1/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "renders/j1/chunks/chunk-00000000.video",
                "renders/j1/pre-render-metadata.json"
            ]
        );
        assert_eq!(listed[0].size, 3);
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(
            store.put("../escape", vec![]).await,
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put("a/b", b"1".to_vec()).await.unwrap();

        let keys = vec!["a/b".to_string(), "a/c".to_string()];
        assert_eq!(store.delete(&keys).await.unwrap(), 1);
        assert_eq!(store.delete(&keys).await.unwrap(), 0);
        assert!(matches!(
            store.get("a/b").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_skips_in_flight_writes() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put("renders/j1/out.mp4", b"done".to_vec()).await.unwrap();
        std::fs::write(
            dir.path().join("renders/j1/.partial-0123-chunk-00000001.video"),
            b"half",
        )
        .unwrap();

        let listed = store.list("renders/j1/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["renders/j1/out.mp4"]);

        assert!(matches!(
            store.put("renders/j1/.partial-x", vec![]).await,
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_walks_from_prefix_directory() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put("renders/j1/chunks/chunk-00000000.video", vec![1]).await.unwrap();
        store.put("renders/j1/pre-render-metadata.json", vec![2]).await.unwrap();
        store.put("renders/j10/out.mp4", vec![3]).await.unwrap();

        let keys: Vec<_> = store
            .list("renders/j1/pre")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["renders/j1/pre-render-metadata.json"]);

        let keys: Vec<_> = store
            .list("renders/j1")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys.len(), 3);

        assert!(store.list("renders/missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path().join("not-created"));
        assert!(store.list("").await.unwrap().is_empty());
    }
}
