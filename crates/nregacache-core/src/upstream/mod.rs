//! Client for the government MGNREGA data portal.
//!
//! This module provides the `Upstream` seam the retrieval pipeline fetches
//! through, and `UpstreamClient`, the HTTP implementation with bounded
//! timeout and linear retry backoff.
//!
//! The portal's payload is loosely structured: any field may be missing or
//! non-numeric. `RawPayload` coerces such fields to zero instead of failing.

pub mod client;
pub mod error;
pub mod payload;

use async_trait::async_trait;

use crate::models::{PerformanceRecord, PeriodId, RegionId};

pub use client::UpstreamClient;
pub use error::UpstreamError;
pub use payload::RawPayload;

/// Live source of district records.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(
        &self,
        region: &RegionId,
        period: &PeriodId,
    ) -> Result<PerformanceRecord, UpstreamError>;
}
