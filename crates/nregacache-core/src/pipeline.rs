//! The tiered retrieval pipeline.
//!
//! A lookup walks the tiers in order and stops at the first hit:
//!
//! 1. each cache layer in order (distributed, then local)
//! 2. the record store, if the stored copy is fresh
//! 3. the upstream portal, persisting and caching what it returns
//! 4. the stored copy for the key, however old
//! 5. the most recently updated stored copy for the region, any period
//! 6. a synthesized placeholder
//!
//! Step 6 always produces a record unless the synthesizer itself fails, so
//! callers effectively always receive data. The `source` field of the returned
//! record says which tier it came from.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, LocalCache, RedisCache};
use crate::config::Config;
use crate::freshness::{self, DEFAULT_MAX_AGE_HOURS};
use crate::models::{DataSource, PerformanceRecord, PeriodId, RecordKey, RegionId};
use crate::store::RecordStore;
use crate::synth::{PlaceholderSynthesizer, SynthesisError, Synthesizer};
use crate::upstream::{Upstream, UpstreamClient, UpstreamError};

/// Default lifetime of cache entries. Kept below the freshness threshold.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Every tier, synthesis included, came up empty.
    #[error("No data available for {key}")]
    NoData {
        key: RecordKey,
        #[source]
        source: SynthesisError,
    },
}

/// Outcome of a bulk lookup. One key failing never affects the others.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub succeeded: Vec<PerformanceRecord>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub region_id: RegionId,
    pub error: String,
}

type SharedFetch = Shared<BoxFuture<'static, Result<PerformanceRecord, UpstreamError>>>;
type InflightMap = Arc<Mutex<HashMap<RecordKey, SharedFetch>>>;

fn lock_inflight(map: &InflightMap) -> MutexGuard<'_, HashMap<RecordKey, SharedFetch>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the in-flight entry when the fetching caller finishes or is dropped.
struct InflightGuard {
    map: InflightMap,
    key: RecordKey,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        lock_inflight(&self.map).remove(&self.key);
    }
}

pub struct RetrievalPipeline {
    caches: Vec<Arc<dyn CacheLayer>>,
    store: Arc<RecordStore>,
    upstream: Arc<dyn Upstream>,
    synthesizer: Arc<dyn Synthesizer>,
    cache_ttl: Duration,
    max_age_hours: i64,
    inflight: InflightMap,
}

impl RetrievalPipeline {
    /// A pipeline with no cache layers and default TTL and freshness.
    pub fn new(
        store: Arc<RecordStore>,
        upstream: Arc<dyn Upstream>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            caches: Vec::new(),
            store,
            upstream,
            synthesizer,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wire the production pipeline: Redis (when enabled), then the local
    /// cache, the given store, the portal client and the placeholder synthesizer.
    pub fn from_config(config: &Config, store: Arc<RecordStore>) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let mut pipeline = Self::new(store, Arc::new(upstream), Arc::new(PlaceholderSynthesizer))
            .with_cache_ttl(config.cache.ttl())
            .with_max_age_hours(config.freshness_max_age_hours);

        if let Some(redis) = RedisCache::from_config(&config.cache) {
            pipeline = pipeline.with_cache(Arc::new(redis));
        }
        Ok(pipeline.with_cache(Arc::new(LocalCache::new())))
    }

    /// Append a cache layer. Layers are consulted in the order added.
    pub fn with_cache(mut self, layer: Arc<dyn CacheLayer>) -> Self {
        self.caches.push(layer);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age_hours = hours;
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn cache_layer_names(&self) -> Vec<&'static str> {
        self.caches.iter().map(|layer| layer.name()).collect()
    }

    /// Look up one record, falling through the tiers until one answers.
    pub async fn get_record(
        &self,
        region: &RegionId,
        period: &PeriodId,
        use_cache: bool,
    ) -> Result<PerformanceRecord, PipelineError> {
        let key = RecordKey::new(region.clone(), *period);
        self.lookup(key, use_cache, false).await
    }

    /// Force a revalidation against upstream, bypassing caches and freshness.
    pub async fn refresh(
        &self,
        region: &RegionId,
        period: &PeriodId,
    ) -> Result<PerformanceRecord, PipelineError> {
        let key = RecordKey::new(region.clone(), *period);
        self.lookup(key, false, true).await
    }

    /// Look up several regions for one period concurrently.
    pub async fn get_records(
        &self,
        regions: &[RegionId],
        period: &PeriodId,
        use_cache: bool,
    ) -> BulkResult {
        let lookups = regions.iter().map(|region| async move {
            (region, self.get_record(region, period, use_cache).await)
        });

        let mut result = BulkResult::default();
        for (region, outcome) in futures::future::join_all(lookups).await {
            match outcome {
                Ok(record) => result.succeeded.push(record),
                Err(e) => result.failed.push(BulkFailure {
                    region_id: region.clone(),
                    error: e.to_string(),
                }),
            }
        }
        result
    }

    /// Persist a synthesized record for the key.
    ///
    /// Only used to give a freshly seeded registry some history. Lookups never
    /// persist what they synthesize.
    pub async fn seed(&self, region: &RegionId, period: &PeriodId) -> Option<PerformanceRecord> {
        match self.synthesizer.synthesize(region, period) {
            Ok(record) => self.store.upsert(&record).await,
            Err(e) => {
                warn!(error = %e, "Failed to synthesize seed record");
                None
            }
        }
    }

    /// Drop the key from every cache layer.
    pub async fn invalidate(&self, region: &RegionId, period: &PeriodId) {
        let cache_key = RecordKey::new(region.clone(), *period).cache_key();
        for layer in &self.caches {
            layer.delete(&cache_key).await;
        }
        debug!(region = %region, period = %period, "Invalidated cached record");
    }

    /// Empty every cache layer.
    pub async fn clear_cache(&self) {
        for layer in &self.caches {
            layer.clear().await;
        }
        info!(layers = self.caches.len(), "Cleared caches");
    }

    async fn lookup(
        &self,
        key: RecordKey,
        use_cache: bool,
        force_refresh: bool,
    ) -> Result<PerformanceRecord, PipelineError> {
        let cache_key = key.cache_key();

        if use_cache {
            for layer in &self.caches {
                if let Some(record) = layer.get(&cache_key).await {
                    debug!(key = %key, layer = layer.name(), "Cache hit");
                    return Ok(record.served_from(DataSource::Cache));
                }
            }
        }

        let stored = self.store.find(&key.region, &key.period).await;
        if !force_refresh {
            if let Some(record) = stored.as_ref().filter(|r| self.is_fresh(r)) {
                debug!(key = %key, "Serving fresh stored record");
                if use_cache {
                    self.write_through(&cache_key, record).await;
                }
                return Ok(record.clone().served_from(DataSource::Store));
            }
        }

        match self.fetch_and_persist(&key).await {
            Ok(persisted) => {
                if use_cache {
                    self.write_through(&cache_key, &persisted).await;
                }
                info!(key = %key, "Fetched record from upstream");
                return Ok(persisted);
            }
            Err(e) => warn!(key = %key, error = %e, "Upstream fetch failed"),
        }

        if let Some(record) = stored {
            warn!(
                key = %key,
                age = %freshness::age_display(record.data_quality.last_updated),
                "Serving stale stored record"
            );
            return Ok(record.served_from(DataSource::Store));
        }

        if let Some(record) = self.store.find_most_recent(&key.region).await {
            warn!(
                key = %key,
                period = %record.period_id,
                "Serving most recent stored period instead"
            );
            return Ok(record.served_from(DataSource::Store));
        }

        match self.synthesizer.synthesize(&key.region, &key.period) {
            Ok(record) => {
                warn!(key = %key, "No data in any tier, serving synthesized record");
                Ok(record)
            }
            Err(source) => Err(PipelineError::NoData { key, source }),
        }
    }

    /// Synthetic records are never fresh, so real data replaces them on the
    /// next successful fetch.
    fn is_fresh(&self, record: &PerformanceRecord) -> bool {
        !record.is_synthetic()
            && freshness::is_fresh(record.data_quality.last_updated, self.max_age_hours)
    }

    async fn write_through(&self, cache_key: &str, record: &PerformanceRecord) {
        for layer in &self.caches {
            layer.put(cache_key, record, self.cache_ttl).await;
        }
    }

    /// Fetch from upstream and persist the result, sharing one request and one
    /// store write among concurrent callers of the same key.
    async fn fetch_and_persist(
        &self,
        key: &RecordKey,
    ) -> Result<PerformanceRecord, UpstreamError> {
        let (fetch, guard) = {
            let mut inflight = lock_inflight(&self.inflight);
            match inflight.get(key) {
                Some(existing) => (existing.clone(), None),
                None => {
                    let upstream = Arc::clone(&self.upstream);
                    let store = Arc::clone(&self.store);
                    let owned = key.clone();
                    let fetch = async move {
                        let fetched = upstream.fetch(&owned.region, &owned.period).await?;
                        // Served unpersisted when the store cannot take the write
                        Ok::<_, UpstreamError>(store.upsert(&fetched).await.unwrap_or(fetched))
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key.clone(), fetch.clone());
                    let guard = InflightGuard {
                        map: Arc::clone(&self.inflight),
                        key: key.clone(),
                    };
                    (fetch, Some(guard))
                }
            }
        };

        if guard.is_none() {
            debug!(key = %key, "Joining in-flight upstream fetch");
        }
        let result = fetch.await;
        drop(guard);
        result
    }
}
