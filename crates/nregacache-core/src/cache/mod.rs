//! Cache tier for district records.
//!
//! Two layers share one key scheme and TTL:
//!
//! - `RedisCache`: the distributed layer, optional and disabled by default
//! - `LocalCache`: an in-process map that keeps serving when Redis is down
//!
//! Every layer fails open. A broken backend reads as a miss and writes become
//! no-ops, so the pipeline never fails because of its caches.

pub mod distributed;
pub mod local;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PerformanceRecord;

pub use distributed::RedisCache;
pub use local::LocalCache;

/// Failures inside a cache layer. Logged and absorbed, never returned to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache operation timed out")]
    Timeout,

    #[error("Cached value could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

/// One cache layer of the retrieval cascade.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Short label for log lines.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Option<PerformanceRecord>;

    async fn put(&self, key: &str, record: &PerformanceRecord, ttl: Duration);

    async fn delete(&self, key: &str);

    /// Drop every entry owned by this layer.
    async fn clear(&self);
}
