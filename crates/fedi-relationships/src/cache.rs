//! Session-scoped memo of last-known relationship and like state.
//!
//! Never authoritative: entries older than the reconciliation window are only
//! handed out through `peek`, and callers are expected to re-check the backend.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::events::{EventBus, Listener};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct RelationshipCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    window: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> RelationshipCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(window: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            window,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The cached value if it was stored within the reconciliation window
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.window => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// The cached value regardless of age, for display while a re-check runs
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).map(|e| e.value.clone())
    }

    /// Store a value; the last write wins
    pub fn put(&self, key: K, value: V) {
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.write().remove(key);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        if !entries.is_empty() {
            debug!(entries = entries.len(), "Clearing relationship cache");
        }
        entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> RelationshipCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Clear the cache whenever `event` is broadcast, for as long as the listener lives
    pub fn clear_on(self: &Arc<Self>, bus: &EventBus, event: &str) -> Listener {
        let cache = Arc::downgrade(self);
        bus.listen(event, move |_| {
            let cache = cache.clone();
            async move {
                if let Some(cache) = cache.upgrade() {
                    cache.clear();
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BusEvent, FOLLOW_UPDATE};

    #[tokio::test(start_paused = true)]
    async fn test_fresh_within_window() {
        let cache = RelationshipCache::new(Duration::from_secs(30));
        cache.put("k", 1);
        assert_eq!(cache.get_fresh(&"k"), Some(1));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get_fresh(&"k"), None);
        assert_eq!(cache.peek(&"k"), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins() {
        let cache = RelationshipCache::new(Duration::from_secs(30));
        cache.put("k", 1);
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put("k", 2);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(cache.get_fresh(&"k"), Some(2));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = RelationshipCache::new(Duration::from_secs(30));
        cache.put("a", 1);
        cache.put("b", 2);
        cache.invalidate(&"a");
        assert_eq!(cache.peek(&"a"), None);
        assert_eq!(cache.peek(&"b"), Some(2));
    }

    #[tokio::test]
    async fn test_cleared_by_broadcast() {
        let bus = EventBus::new();
        let cache = Arc::new(RelationshipCache::new(Duration::from_secs(30)));
        let _listener = cache.clear_on(&bus, FOLLOW_UPDATE);

        cache.put("k".to_string(), 1);
        bus.publish(BusEvent::follow_update());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.stats().entries, 0);
    }
}
