use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{CacheError, CacheLayer};
use crate::config::CacheConfig;
use crate::models::PerformanceRecord;

/// Redis-backed cache layer.
///
/// Keys are stored as `<namespace>:<key>` holding the record as JSON. Each
/// operation opens a multiplexed connection and is bounded by `timeout`, so an
/// unreachable server costs at most one timeout per call.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    namespace: String,
    timeout: Duration,
}

impl RedisCache {
    /// Build the layer from config. Returns `None` when Redis is disabled or
    /// the URL is unusable; no connection is attempted here.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.enable_redis {
            debug!("Redis cache disabled");
            return None;
        }
        match Self::new(&config.redis_url, &config.redis_namespace, config.redis_timeout()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Redis cache not configured, continuing without it");
                None
            }
        }
    }

    pub fn new(url: &str, namespace: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            namespace: namespace.to_string(),
            timeout,
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Run `op` under the per-call timeout.
    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<PerformanceRecord>, CacheError> {
        let key = self.namespaced(key);
        let raw: Option<String> = self
            .bounded(async {
                let mut conn = self.connection().await?;
                let raw: Option<String> = conn.get(&key).await?;
                Ok(raw)
            })
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn try_put(
        &self,
        key: &str,
        record: &PerformanceRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = self.namespaced(key);
        let json = serde_json::to_string(record)?;
        // Redis rejects EX 0
        let ttl_secs = ttl.as_secs().max(1);
        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(&json)
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        let key = self.namespaced(key);
        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: () = conn.del(&key).await?;
            Ok(())
        })
        .await
    }

    async fn try_clear(&self) -> Result<usize, CacheError> {
        let pattern = self.namespaced("*");
        self.bounded(async {
            let mut conn = self.connection().await?;
            let keys: Vec<String> = redis::cmd("KEYS")
                .arg(&pattern)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let _: () = conn.del(&keys).await?;
            }
            Ok(keys.len())
        })
        .await
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Option<PerformanceRecord> {
        match self.try_get(key).await {
            Ok(record) => record,
            Err(e) => {
                debug!(key, error = %e, "Redis get failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, key: &str, record: &PerformanceRecord, ttl: Duration) {
        if let Err(e) = self.try_put(key, record, ttl).await {
            debug!(key, error = %e, "Redis put failed");
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.try_delete(key).await {
            debug!(key, error = %e, "Redis delete failed");
        }
    }

    async fn clear(&self) {
        match self.try_clear().await {
            Ok(count) => debug!(count, namespace = %self.namespace, "Cleared Redis cache"),
            Err(e) => debug!(error = %e, "Redis clear failed"),
        }
    }
}
