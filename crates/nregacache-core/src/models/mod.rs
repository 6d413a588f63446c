//! Data models for district performance data.
//!
//! This module contains:
//!
//! - `RegionId`, `PeriodId`, `RecordKey`: validated identifiers
//! - `PerformanceRecord`: the canonical record served by every tier
//! - `Region`: district reference data

pub mod ids;
pub mod record;
pub mod region;

pub use ids::{IdError, PeriodId, RecordKey, RegionId};
pub use record::{
    Assets, Budget, DataQuality, DataSource, HeadCount, Performance, PerformanceRecord,
    SocialAudit, WagePayments, WorkProgress,
};
pub use region::{default_regions, Region, DEFAULT_STATE_CODE};
