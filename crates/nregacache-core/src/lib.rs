//! nregacache core library.
//!
//! Serves MGNREGA district performance records from a chain of tiers so that
//! callers get an answer even when the government portal is slow or down:
//!
//! - `cache`: distributed (Redis) and in-process cache layers
//! - `store`: durable file-backed record store and region registry
//! - `upstream`: portal client with timeout and retry
//! - `synth`: deterministic placeholder records
//! - `pipeline`: the lookup cascade tying the tiers together
//! - `scheduler`: background refresh of priority districts and retention cleanup

pub mod cache;
pub mod config;
pub mod freshness;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod synth;
pub mod upstream;

pub use config::Config;
pub use models::{DataSource, PerformanceRecord, PeriodId, RecordKey, Region, RegionId};
pub use pipeline::{BulkResult, PipelineError, RetrievalPipeline};
pub use scheduler::{RefreshScheduler, RunOutcome, SchedulerStatus};
pub use store::RecordStore;
