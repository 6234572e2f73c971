use moka::future::Cache;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::PlannerResult;
use crate::observability::SideChannelMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    data: serde_json::Value,
    cached_at: i64,
}

/// One cached result per list query.
///
/// The record store stays authoritative. Every local mutation calls
/// [`ListCache::invalidate`], so a reader never sees its own writes go
/// missing.
#[derive(Clone)]
pub struct ListCache {
    cache: Cache<String, CacheEntry>,
    metrics: Arc<SideChannelMetrics>,
}

impl ListCache {
    pub fn new(settings: &CacheConfig, metrics: Arc<SideChannelMetrics>) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.max_capacity)
            .time_to_live(Duration::from_secs(settings.ttl_seconds))
            .build();
        Self { cache, metrics }
    }

    /// Key for a query: its name plus the serialized filter and page.
    pub fn key<Q: Serialize>(query: &str, params: &Q) -> String {
        match serde_json::to_string(params) {
            Ok(json) => format!("{query}:{json}"),
            Err(_) => format!("{query}:?"),
        }
    }

    /// Returns the cached value for `key` or runs `fetch` and caches its
    /// result. Errors are never cached.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: String, fetch: F) -> PlannerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PlannerResult<T>>,
    {
        if let Some(entry) = self.cache.get(&key).await {
            if let Ok(value) = serde_json::from_value(entry.data) {
                debug!("List cache hit for key: {}", key);
                self.metrics.record_cache_hit();
                return Ok(value);
            }
        }
        self.metrics.record_cache_miss();

        let value = fetch().await?;
        if let Ok(data) = serde_json::to_value(&value) {
            let entry = CacheEntry {
                data,
                cached_at: chrono::Utc::now().timestamp(),
            };
            self.cache.insert(key, entry).await;
        }
        Ok(value)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate_all();
        debug!("List cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> ListCache {
        ListCache::new(
            &CacheConfig {
                max_capacity: 16,
                ttl_seconds: 60,
            },
            Arc::new(SideChannelMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        };

        let first: Vec<i32> = cache.get_or_fetch("k".into(), fetch).await.unwrap();
        let second: Vec<i32> = cache.get_or_fetch("k".into(), fetch).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate();
        let _: Vec<i32> = cache.get_or_fetch("k".into(), fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_keys_include_params() {
        assert_eq!(ListCache::key("ppmps", &(2025, 1)), "ppmps:[2025,1]");
    }
}
