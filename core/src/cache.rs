//! C3: keyed cache with dependency-tracked transitive invalidation.
//!
//! Canonical keys: `context:{level}:{id}:{user_id}` and
//! `resolved_context:{level}:{id}:{user_id}`. Readers proceed freely;
//! `invalidate` takes the write lock for the duration of the transitive
//! closure walk so readers never observe a partially-invalidated state.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
    dependencies: HashSet<String>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

pub const DEFAULT_TTL_SECONDS: u64 = 300;

struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// dep key -> set of keys that depend on it.
    reverse_deps: HashMap<String, HashSet<String>>,
}

pub struct CacheLayer {
    inner: RwLock<Inner>,
    default_ttl: Duration,
}

impl CacheLayer {
    pub fn new(default_ttl_seconds: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                reverse_deps: HashMap::new(),
            }),
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let inner = self.inner.read().await;
        match inner.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub async fn put(&self, key: String, value: Value, ttl: Option<Duration>, dependencies: HashSet<String>) {
        tracing::trace!(key = %key, deps = dependencies.len(), "cache put");
        let mut inner = self.inner.write().await;
        for dep in &dependencies {
            inner
                .reverse_deps
                .entry(dep.clone())
                .or_default()
                .insert(key.clone());
        }
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl: ttl.unwrap_or(self.default_ttl),
                dependencies,
            },
        );
    }

    /// Removes `key` and, transitively, every key that lists it (or a key
    /// already slated for removal) as a dependency. Atomic with respect to
    /// the expansion: the whole closure is computed and removed under one
    /// write-lock acquisition.
    pub async fn invalidate(&self, key: &str) {
        let mut inner = self.inner.write().await;
        let mut to_remove: Vec<String> = vec![key.to_string()];
        let mut seen: HashSet<String> = HashSet::new();
        let mut i = 0;
        while i < to_remove.len() {
            let current = to_remove[i].clone();
            i += 1;
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(dependents) = inner.reverse_deps.remove(&current) {
                for dependent in dependents {
                    to_remove.push(dependent);
                }
            }
        }
        for k in &to_remove {
            inner.entries.remove(k);
        }
        // Drop dangling dependency registrations pointing at removed keys.
        for deps in inner.reverse_deps.values_mut() {
            for k in &to_remove {
                deps.remove(k);
            }
        }
        tracing::debug!(key = %key, evicted = to_remove.len(), "cache invalidated");
    }

    /// Prefetches `keys` via `fetch`, skipping any already cached and not expired.
    pub async fn warm<F, Fut>(&self, keys: &[String], fetch: F)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Option<(Value, HashSet<String>)>>,
    {
        for key in keys {
            if self.get(key).await.is_some() {
                continue;
            }
            if let Some((value, deps)) = fetch(key.clone()).await {
                self.put(key.clone(), value, None, deps).await;
            }
        }
    }

    pub fn context_key(level: &str, id: &str, user_id: &str) -> String {
        format!("context:{level}:{id}:{user_id}")
    }

    pub fn resolved_context_key(level: &str, id: &str, user_id: &str) -> String {
        format!("resolved_context:{level}:{id}:{user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = CacheLayer::new(DEFAULT_TTL_SECONDS);
        cache
            .put("k1".to_string(), json!({"a": 1}), None, HashSet::new())
            .await;
        assert_eq!(cache.get("k1").await, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn invalidate_removes_transitive_dependents() {
        let cache = CacheLayer::new(DEFAULT_TTL_SECONDS);
        let mut deps_a: HashSet<String> = HashSet::new();
        deps_a.insert("root".to_string());
        cache.put("a".to_string(), json!(1), None, deps_a).await;

        let mut deps_b: HashSet<String> = HashSet::new();
        deps_b.insert("a".to_string());
        cache.put("b".to_string(), json!(2), None, deps_b).await;

        cache.put("root".to_string(), json!(0), None, HashSet::new()).await;

        cache.invalidate("root").await;

        assert!(cache.get("root").await.is_none());
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let cache = CacheLayer::new(0);
        cache
            .put("k".to_string(), json!(1), Some(Duration::from_millis(0)), HashSet::new())
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get("k").await.is_none());
    }
}
