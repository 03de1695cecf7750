//! In-memory TTL caches
//!
//! Policy configurations are memoized per `(policy id, category)` so repeated
//! comparisons sharing a policy do not refetch it, and the normalized
//! inventory is kept for a short while between requests.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CacheConfig;
use crate::models::{ConfigItem, PolicyCategory};
use crate::services::inventory::Inventory;

/// Cached value with its insertion time
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Bounded map whose entries expire after a TTL
#[derive(Debug)]
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    max_entries: usize,
    default_ttl: Duration,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }

    /// Live value for `key`, if any
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone())
    }

    pub async fn set(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| !entry.is_expired());
        }
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(key, CacheEntry::new(value, self.default_ttl));
    }

    /// Cached value, or the loader's result which is then cached.
    ///
    /// Loader errors are returned as-is and nothing is stored.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }
        let value = load().await?;
        self.set(key, value.clone()).await;
        Ok(value)
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().await.remove(key).map(|e| e.data)
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop expired entries, returning how many were removed
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired cache entries");
        }
        evicted
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let total = entries.len();
        let expired = entries.values().filter(|e| e.is_expired()).count();

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            valid_entries: total - expired,
            max_entries: self.max_entries,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub valid_entries: usize,
    pub max_entries: usize,
}

/// Configuration endpoints depend on the category, so it is part of the key
pub type PolicyConfigKey = (String, PolicyCategory);
pub type PolicyConfigCache = Cache<PolicyConfigKey, Arc<Vec<ConfigItem>>>;
pub type InventoryCache = Cache<String, Arc<Inventory>>;

/// The caches shared by the services, absent when caching is disabled
#[derive(Clone, Default)]
pub struct Caches {
    pub policy_config: Option<Arc<PolicyConfigCache>>,
    pub inventory: Option<Arc<InventoryCache>>,
}

impl Caches {
    pub fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::default();
        }
        Self {
            policy_config: Some(Arc::new(Cache::new(
                config.max_entries,
                Duration::from_secs(config.policy_config_ttl_secs),
            ))),
            // A tenant has exactly one inventory
            inventory: Some(Arc::new(Cache::new(
                1,
                Duration::from_secs(config.inventory_ttl_secs),
            ))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy_config.is_some() || self.inventory.is_some()
    }

    pub async fn stats(&self) -> Option<CacheServiceStats> {
        let policy_config = match &self.policy_config {
            Some(cache) => Some(cache.stats().await),
            None => None,
        };
        let inventory = match &self.inventory {
            Some(cache) => Some(cache.stats().await),
            None => None,
        };
        self.is_enabled().then_some(CacheServiceStats {
            policy_config,
            inventory,
        })
    }
}

/// Statistics for every cache
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheServiceStats {
    pub policy_config: Option<CacheStats>,
    pub inventory: Option<CacheStats>,
}
