//! Persistent cache storage on the local filesystem.
//!
//! Layout: `<root>/<store name>/<sha256 of request key>.json`. Each file holds
//! the request identity, the response and the time it was cached. Writes land
//! in a temporary file first and are renamed into place, so readers never see
//! a half-written entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::storage::{check_storable, validate_name};
use super::{Cache, CacheError, CacheStorage, CachedData, CachedResponse};
use crate::models::{PageRequest, PageResponse};

/// Distinguishes temp files of concurrent writes to the same key.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    method: String,
    url: String,
    #[serde(flatten)]
    cached: CachedResponse,
}

#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of existing stores, sorted.
    async fn store_names(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn match_request(
        &self,
        request: &PageRequest,
    ) -> Result<Option<CachedResponse>, CacheError> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        for name in self.store_names().await? {
            let store = DiskCache::new(self.root.join(&name));
            if let Some(hit) = store.match_request(request).await? {
                debug!(store = %name, url = %request.url, "Cache hit");
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).await?;
        Ok(Arc::new(DiskCache::new(dir)))
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        validate_name(name)?;
        match fs::remove_dir_all(self.root.join(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// One named store: a directory of entry files.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn match_request(
        &self,
        request: &PageRequest,
    ) -> Result<Option<CachedResponse>, CacheError> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        let path = self.entry_path(&request.cache_key());
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: DiskEntry =
            serde_json::from_str(&contents).map_err(|source| CacheError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Some(entry.cached))
    }

    async fn put(&self, request: &PageRequest, response: PageResponse) -> Result<(), CacheError> {
        check_storable(request, &response)?;
        let key = request.cache_key();
        let entry = DiskEntry {
            method: request.method.clone(),
            url: key.clone(),
            cached: CachedData::new(response),
        };
        let contents = serde_json::to_string_pretty(&entry).map_err(std::io::Error::other)?;

        fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(&key);
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{}.{}.tmp", std::process::id(), seq));
        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (DiskCacheStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = DiskCacheStorage::new(temp_dir.path().join("cache"));
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_root_is_a_miss() {
        let (storage, _temp_dir) = create_test_storage();
        let hit = storage
            .match_request(&PageRequest::get("https://example.com/"))
            .await
            .expect("lookup");
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_open_creates_store_directory() {
        let (storage, _temp_dir) = create_test_storage();
        storage.open("pagecache-v1").await.expect("open");
        assert!(storage.root().join("pagecache-v1").is_dir());
    }

    #[tokio::test]
    async fn test_put_then_match() {
        let (storage, _temp_dir) = create_test_storage();
        let request = PageRequest::get("https://example.com/index.html");
        let response = PageResponse::ok("<h1>hi</h1>").with_header("content-type", "text/html");

        let cache = storage.open("v1").await.expect("open");
        cache.put(&request, response.clone()).await.expect("put");

        let hit = storage.match_request(&request).await.expect("lookup").expect("hit");
        assert_eq!(hit.data, response);
    }

    #[tokio::test]
    async fn test_entries_survive_new_storage_instance() {
        let (storage, _temp_dir) = create_test_storage();
        let request = PageRequest::get("https://example.com/app.js");
        storage.open("v1").await.expect("open")
            .put(&request, PageResponse::ok("console.log(1)"))
            .await
            .expect("put");

        let reopened = DiskCacheStorage::new(storage.root().to_path_buf());
        let hit = reopened.match_request(&request).await.expect("lookup").expect("hit");
        assert_eq!(hit.data.text(), "console.log(1)");
    }

    #[tokio::test]
    async fn test_fragment_shares_entry() {
        let (storage, _temp_dir) = create_test_storage();
        storage.open("v1").await.expect("open")
            .put(&PageRequest::get("https://example.com/doc#a"), PageResponse::ok("doc"))
            .await
            .expect("put");

        let hit = storage
            .match_request(&PageRequest::get("https://example.com/doc#b"))
            .await
            .expect("lookup");
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_entry_file_is_readable_json() {
        let (storage, _temp_dir) = create_test_storage();
        let request = PageRequest::get("https://example.com/a");
        storage.open("v1").await.expect("open")
            .put(&request, PageResponse::ok("x"))
            .await
            .expect("put");

        let dir = storage.root().join("v1");
        let files: Vec<_> = std::fs::read_dir(&dir)
            .expect("read dir")
            .map(|e| e.expect("entry").path())
            .collect();
        assert_eq!(files.len(), 1, "temp file should be renamed away");

        let content = std::fs::read_to_string(&files[0]).expect("read entry");
        assert!(content.contains("\"url\": \"https://example.com/a\""));
        assert!(content.contains("\"cached_at\""));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_lookup_error() {
        let (storage, _temp_dir) = create_test_storage();
        let request = PageRequest::get("https://example.com/broken");
        storage.open("v1").await.expect("open")
            .put(&request, PageResponse::ok("x"))
            .await
            .expect("put");

        let dir = storage.root().join("v1");
        for entry in std::fs::read_dir(&dir).expect("read dir") {
            std::fs::write(entry.expect("entry").path(), "{ not json").expect("overwrite");
        }

        let err = storage.match_request(&request).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let (storage, _temp_dir) = create_test_storage();
        assert!(matches!(
            storage.open("../escape").await,
            Err(CacheError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_partial_content() {
        let (storage, _temp_dir) = create_test_storage();
        let cache = storage.open("v1").await.expect("open");
        let err = cache
            .put(&PageRequest::get("https://example.com/video"), PageResponse::new(206, "part"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::PartialContent));
    }

    #[tokio::test]
    async fn test_delete_store() {
        let (storage, _temp_dir) = create_test_storage();
        let request = PageRequest::get("https://example.com/a");
        storage.open("v1").await.expect("open")
            .put(&request, PageResponse::ok("x"))
            .await
            .expect("put");

        assert!(storage.delete("v1").await.expect("delete"));
        assert!(!storage.delete("v1").await.expect("delete again"));
        assert!(storage.match_request(&request).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn test_stores_searched_in_name_order() {
        let (storage, _temp_dir) = create_test_storage();
        let request = PageRequest::get("https://example.com/a");
        storage.open("b").await.expect("open")
            .put(&request, PageResponse::ok("from b"))
            .await
            .expect("put");
        storage.open("a").await.expect("open")
            .put(&request, PageResponse::ok("from a"))
            .await
            .expect("put");

        let hit = storage.match_request(&request).await.expect("lookup").expect("hit");
        assert_eq!(hit.data.text(), "from a");
    }
}
