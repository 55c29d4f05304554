//! Process-local cache storage.
//!
//! Nothing survives a restart. Stores are searched in creation order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::storage::{check_storable, validate_name};
use super::{Cache, CacheError, CacheStorage, CachedData, CachedResponse};
use crate::models::{PageRequest, PageResponse};

#[derive(Default)]
pub struct MemoryCacheStorage {
    stores: RwLock<Vec<(String, Arc<MemoryCache>)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn match_request(
        &self,
        request: &PageRequest,
    ) -> Result<Option<CachedResponse>, CacheError> {
        let stores = self.stores.read().await.clone();
        for (_, store) in stores {
            if let Some(hit) = store.match_request(request).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError> {
        validate_name(name)?;
        let mut stores = self.stores.write().await;
        if let Some((_, store)) = stores.iter().find(|(existing, _)| existing == name) {
            return Ok(store.clone());
        }
        let store = Arc::new(MemoryCache::default());
        stores.push((name.to_string(), store.clone()));
        Ok(store)
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|(existing, _)| existing != name);
        Ok(stores.len() != before)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedResponse>>,
}

#[async_trait]
impl Cache for MemoryCache {
    async fn match_request(
        &self,
        request: &PageRequest,
    ) -> Result<Option<CachedResponse>, CacheError> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        let entries = self.entries.read().await;
        Ok(entries.get(&request.cache_key()).cloned())
    }

    async fn put(&self, request: &PageRequest, response: PageResponse) -> Result<(), CacheError> {
        check_storable(request, &response)?;
        self.entries
            .write()
            .await
            .insert(request.cache_key(), CachedData::new(response));
        Ok(())
    }
}
