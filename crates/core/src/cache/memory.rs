//! Process-local [`CacheStorage`] backend.
//!
//! Uses nested BTreeMaps behind a tokio RwLock. Nothing survives the process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::hash::compute_cache_key;
use super::{CacheStorage, StoredEntry, VaryValues, validate_name};
use crate::{Error, RequestDescriptor, ResponseSnapshot};

#[derive(Debug, Clone)]
struct MemoryEntry {
    method: String,
    url: String,
    vary: VaryValues,
    response: ResponseSnapshot,
    stored_at: String,
}

impl MemoryEntry {
    fn new(request: &RequestDescriptor, response: &ResponseSnapshot, stored_at: &str) -> (String, Self) {
        let url = request.cache_url();
        let method = request.method.to_ascii_uppercase();
        let key = compute_cache_key(&method, &url);
        let entry = Self {
            method,
            url,
            vary: VaryValues::capture(request, response),
            response: response.clone(),
            stored_at: stored_at.to_string(),
        };
        (key, entry)
    }
}

type Store = BTreeMap<String, MemoryEntry>;

/// In-memory store set.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<BTreeMap<String, Store>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), Error> {
        validate_name(name)?;
        self.stores.write().await.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, name: &str, request: &RequestDescriptor) -> Result<Option<ResponseSnapshot>, Error> {
        let key = compute_cache_key(&request.method, &request.cache_url());
        let stores = self.stores.read().await;
        let hit = stores
            .get(name)
            .and_then(|store| store.get(&key))
            .filter(|entry| entry.vary.matches(request))
            .map(|entry| entry.response.clone());
        Ok(hit)
    }

    async fn put(&self, name: &str, request: &RequestDescriptor, response: &ResponseSnapshot) -> Result<(), Error> {
        validate_name(name)?;
        let now = chrono::Utc::now().to_rfc3339();
        let (key, entry) = MemoryEntry::new(request, response, &now);
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key, entry);
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: &[(RequestDescriptor, ResponseSnapshot)]) -> Result<(), Error> {
        validate_name(name)?;
        let now = chrono::Utc::now().to_rfc3339();
        let prepared: Vec<_> = entries
            .iter()
            .map(|(request, response)| MemoryEntry::new(request, response, &now))
            .collect();

        // Single write guard: readers never observe a partial batch.
        let mut stores = self.stores.write().await;
        let store = stores.entry(name.to_string()).or_default();
        store.extend(prepared);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        Ok(self.stores.write().await.remove(name).is_some())
    }

    async fn list_names(&self) -> Result<Vec<String>, Error> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn entries(&self, name: &str) -> Result<Vec<StoredEntry>, Error> {
        let stores = self.stores.read().await;
        let mut entries: Vec<StoredEntry> = stores
            .get(name)
            .map(|store| {
                store
                    .values()
                    .map(|e| StoredEntry {
                        method: e.method.clone(),
                        url: e.url.clone(),
                        response: e.response.clone(),
                        stored_at: e.stored_at.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(entries)
    }

    async fn count(&self, name: &str) -> Result<usize, Error> {
        Ok(self.stores.read().await.get(name).map_or(0, BTreeMap::len))
    }
}
