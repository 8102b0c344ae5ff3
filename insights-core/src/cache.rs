//! Tenant-scoped cache of shaped insight pages.
//!
//! Keys have the form `{prefix}:{tenant_id}:{sha256(filter)}`. Reads are
//! best-effort: any store or decode failure is logged and treated as a miss.
//! Writes go through the [`TaskQueue`] and never block the request path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::InsightsError;
use crate::filter::InsightsFilter;
use crate::shaper::InsightsPage;
use crate::task_queue::TaskQueue;

// ------------------------------------------------------------------ //
//  Store trait                                                        //
// ------------------------------------------------------------------ //

/// Key/value transport behind [`InsightsCache`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete every key starting with `prefix`; returns how many were removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;
}

// ------------------------------------------------------------------ //
//  MemoryCacheStore                                                   //
// ------------------------------------------------------------------ //

/// In-process store with per-entry expiry.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, (_, expires))| *expires > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Fingerprinted keys are rarely read again once stale; sweep on write.
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, (_, expires)| *expires > now);
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

// ------------------------------------------------------------------ //
//  InsightsCache                                                      //
// ------------------------------------------------------------------ //

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub key_prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(8 * 60 * 60),
            key_prefix: "insights".to_string(),
        }
    }
}

pub struct InsightsCache {
    store: Arc<dyn CacheStore>,
    queue: Arc<TaskQueue>,
    settings: CacheSettings,
}

impl InsightsCache {
    pub fn new(store: Arc<dyn CacheStore>, queue: Arc<TaskQueue>, settings: CacheSettings) -> Self {
        Self {
            store,
            queue,
            settings,
        }
    }

    /// Deterministic key for `(tenant_id, filter)`.
    pub fn fingerprint(&self, tenant_id: &str, filter: &InsightsFilter) -> Result<String, InsightsError> {
        let canonical = serde_json::to_vec(filter)
            .map_err(|e| InsightsError::Cache(format!("cannot serialize filter: {e}")))?;
        let digest = hex::encode(Sha256::digest(&canonical));
        Ok(format!("{}{digest}", self.tenant_prefix(tenant_id)))
    }

    fn tenant_prefix(&self, tenant_id: &str) -> String {
        format!("{}:{tenant_id}:", self.settings.key_prefix)
    }

    /// Cached page for this request, if any.
    pub async fn get(&self, tenant_id: &str, filter: &InsightsFilter) -> Option<InsightsPage> {
        let key = match self.fingerprint(tenant_id, filter) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "cache key unavailable, treating as miss");
                return None;
            }
        };

        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(%key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(%key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<InsightsPage>(&raw) {
            Ok(page) => {
                debug!(%key, "cache hit");
                Some(page)
            }
            Err(e) => {
                warn!(%key, error = %e, "cached entry undecodable, treating as miss");
                None
            }
        }
    }

    /// Schedule a write of `page`. Returns whether the write was queued.
    pub fn set(&self, tenant_id: &str, filter: &InsightsFilter, page: &InsightsPage) -> bool {
        let key = match self.fingerprint(tenant_id, filter) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "cache key unavailable, skipping write");
                return false;
            }
        };
        let value = match serde_json::to_string(page) {
            Ok(value) => value,
            Err(e) => {
                warn!(%key, error = %e, "cannot serialize page, skipping write");
                return false;
            }
        };

        let store = Arc::clone(&self.store);
        let ttl = self.settings.ttl;
        let label = format!("cache-set {key}");
        self.queue.submit(label, async move {
            store.set(&key, &value, ttl).await
        })
    }

    /// Drop every entry of `tenant_id`, or of every tenant when `None`.
    pub async fn invalidate(&self, tenant_id: Option<&str>) -> Result<u64, InsightsError> {
        let prefix = match tenant_id {
            Some(tenant) => self.tenant_prefix(tenant),
            None => format!("{}:", self.settings.key_prefix),
        };
        let deleted = self.store.delete_by_prefix(&prefix).await.map_err(|e| {
            warn!(%prefix, error = %e, "cache invalidation failed");
            InsightsError::Cache(e.to_string())
        })?;
        info!(%prefix, deleted, "cache invalidated");
        Ok(deleted)
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
