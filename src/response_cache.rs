// Short-lived cache of successful JSON responses, shared by all request handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

struct CachedEntry {
    stored_at: Instant,
    body: Value,
}

pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedEntry>>,
    /// One fill lock per key with a fill in flight.
    fills: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            fills: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `key`, if any. Stale entries are left for `insert` to overwrite.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| e.body.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, body: Value) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.into(),
            CachedEntry {
                stored_at: Instant::now(),
                body,
            },
        );
    }

    /// Fresh entry for `key`, or the result of `fill`, which is cached on success.
    /// Concurrent misses on one key wait for a single fill instead of each calling it.
    pub async fn get_or_fill<F, Fut, E>(&self, key: &str, fill: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let lock = self
            .fills
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let result = fill().await;
        if let Ok(body) = &result {
            self.insert(key, body.clone()).await;
        }
        self.fills.lock().await.remove(key);
        result
    }

    /// Drops expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
