use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::CacheLayer;
use crate::models::PerformanceRecord;

#[derive(Debug, Clone)]
struct CachedEntry {
    record: PerformanceRecord,
    cached_at: DateTime<Utc>,
    ttl: chrono::Duration,
}

impl CachedEntry {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.cached_at >= self.ttl
    }
}

/// In-process cache layer.
///
/// Entries expire on read once their TTL has passed, and every write sweeps
/// out whatever else has expired.
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the map itself intact.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live entries, expired ones excluded.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.lock()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheLayer for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> Option<PerformanceRecord> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.is_expired_at(Utc::now()) {
            debug!(key, "Local cache entry expired");
            entries.remove(key);
            return None;
        }
        Some(entry.record.clone())
    }

    async fn put(&self, key: &str, record: &PerformanceRecord, ttl: Duration) {
        // Out-of-range TTLs saturate instead of failing the write
        let ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let entry = CachedEntry {
            record: record.clone(),
            cached_at: Utc::now(),
            ttl,
        };
        let now = entry.cached_at;
        let mut entries = self.lock();
        entries.retain(|_, existing| !existing.is_expired_at(now));
        entries.insert(key.to_string(), entry);
    }

    async fn delete(&self, key: &str) {
        self.lock().remove(key);
    }

    async fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::tests::sample_record;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = LocalCache::new();
        let record = sample_record("0901", "2024-25");
        let key = record.key().cache_key();

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &record, HOUR).await;
        assert_eq!(cache.get(&key).await, Some(record));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = LocalCache::new();
        let record = sample_record("0901", "2024-25");
        cache.put("k", &record, Duration::ZERO).await;

        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_put_sweeps_entries_past_their_ttl() {
        let cache = LocalCache::new();
        cache.lock().insert(
            "stale".to_string(),
            CachedEntry {
                record: sample_record("0902", "2024-25"),
                cached_at: Utc::now() - chrono::Duration::hours(2),
                ttl: chrono::Duration::hours(1),
            },
        );
        cache.put("live", &sample_record("0901", "2024-25"), HOUR).await;

        let entries = cache.lock();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("live"));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = LocalCache::new();
        cache.put("a", &sample_record("0901", "2024-25"), HOUR).await;
        cache.put("b", &sample_record("0902", "2024-25"), HOUR).await;

        cache.delete("a").await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());

        cache.clear().await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = LocalCache::new();
        let mut record = sample_record("0901", "2024-25");
        cache.put("k", &record, HOUR).await;

        record.budget.expenditure = 1.0;
        cache.put("k", &record, HOUR).await;
        assert_eq!(cache.get("k").await.map(|r| r.budget.expenditure), Some(1.0));
    }
}
