//! Background refresh and retention cleanup.
//!
//! Two independent jobs:
//!
//! - **refresh**: every `refresh_interval_hours`, revalidate the priority
//!   districts for the current financial year, one at a time with a pause
//!   between districts. A tick that arrives while a run is in progress is
//!   skipped, never queued.
//! - **cleanup**: daily at `cleanup_hour` local time, delete records older
//!   than the retention window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, Months, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::models::{default_regions, PeriodId};
use crate::pipeline::RetrievalPipeline;

/// Wait used when the next cleanup time cannot be resolved (e.g. a DST gap).
const CLEANUP_RETRY: Duration = Duration::from_secs(60 * 60);

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Record store is unavailable")]
    StoreUnavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub error_runs: u64,
}

/// Snapshot for status reporting.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub last_run_time: Option<DateTime<Utc>>,
    pub stats: RunStats,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub current_period: PeriodId,
    pub last_cleanup_time: Option<DateTime<Utc>>,
    pub last_cleanup_deleted: Option<usize>,
}

/// What a refresh trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run was in progress.
    Skipped,
    /// The registry was empty and has been seeded instead.
    Seeded { regions: usize, records: usize },
    Completed { succeeded: usize, failed: usize },
    Failed,
}

#[derive(Debug, Default)]
struct SchedulerState {
    stats: RunStats,
    last_run_time: Option<DateTime<Utc>>,
    last_cleanup_time: Option<DateTime<Utc>>,
    last_cleanup_deleted: Option<usize>,
}

/// Clears a single-flight flag when the job ends, panics included.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RefreshScheduler {
    pipeline: Arc<RetrievalPipeline>,
    config: SchedulerConfig,
    refreshing: AtomicBool,
    cleaning: AtomicBool,
    state: Mutex<SchedulerState>,
}

impl RefreshScheduler {
    pub fn new(pipeline: Arc<RetrievalPipeline>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            config,
            refreshing: AtomicBool::new(false),
            cleaning: AtomicBool::new(false),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state();
        SchedulerStatus {
            is_running: self.refreshing.load(Ordering::Acquire),
            last_run_time: state.last_run_time,
            stats: state.stats,
            current_period: PeriodId::current(),
            last_cleanup_time: state.last_cleanup_time,
            last_cleanup_deleted: state.last_cleanup_deleted,
        }
    }

    /// Run the refresh job now unless a run is already in progress.
    pub async fn run_refresh_now(&self) -> RunOutcome {
        let Some(_flight) = FlightGuard::acquire(&self.refreshing) else {
            info!("Refresh already in progress, skipping this tick");
            return RunOutcome::Skipped;
        };

        self.state().stats.total_runs += 1;

        let result = self.refresh_batch().await;

        let mut state = self.state();
        match result {
            Ok(outcome) => {
                state.stats.successful_runs += 1;
                state.last_run_time = Some(Utc::now());
                outcome
            }
            Err(e) => {
                error!(error = %e, "Refresh run failed");
                state.stats.error_runs += 1;
                RunOutcome::Failed
            }
        }
    }

    async fn refresh_batch(&self) -> Result<RunOutcome, SchedulerError> {
        let store = self.pipeline.store();
        if !store.is_available() {
            return Err(SchedulerError::StoreUnavailable);
        }

        let period = PeriodId::current();
        let regions = store
            .find_priority_regions(
                &self.config.priority_state_code,
                self.config.max_priority_regions,
            )
            .await;

        if regions.is_empty() {
            info!("No priority regions registered, seeding defaults");
            return Ok(self.seed().await);
        }

        info!(regions = regions.len(), period = %period, "Starting refresh run");
        let mut succeeded = 0;
        let mut failed = 0;

        for (i, region) in regions.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.region_delay()).await;
            }
            match self.pipeline.refresh(&region.region_id, &period).await {
                Ok(record) => {
                    debug!(
                        region = %region.region_id,
                        name = %region.name,
                        source = %record.data_quality.source,
                        "Refreshed region"
                    );
                    succeeded += 1;
                }
                Err(e) => {
                    warn!(region = %region.region_id, error = %e, "Region refresh failed");
                    failed += 1;
                }
            }
        }

        info!(succeeded, failed, period = %period, "Refresh run complete");
        Ok(RunOutcome::Completed { succeeded, failed })
    }

    /// Register the default regions and synthesize two years of history for a
    /// sample of them.
    async fn seed(&self) -> RunOutcome {
        let regions = default_regions();
        let registered = self.pipeline.store().upsert_regions(regions.clone()).await;

        let current = PeriodId::current();
        let periods = [current, current.previous()];
        let mut records = 0;

        for (i, region) in regions.iter().take(self.config.seed_sample_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.seed_delay()).await;
            }
            for period in &periods {
                if self.pipeline.seed(&region.region_id, period).await.is_some() {
                    records += 1;
                }
            }
        }

        info!(regions = registered, records, "Seeded region registry");
        RunOutcome::Seeded {
            regions: registered,
            records,
        }
    }

    /// Delete records past the retention window. Returns `None` when a
    /// cleanup is already running.
    pub async fn run_cleanup(&self) -> Option<usize> {
        let Some(_flight) = FlightGuard::acquire(&self.cleaning) else {
            info!("Cleanup already in progress, skipping");
            return None;
        };

        let years = u32::try_from(self.config.retention_years).unwrap_or(0);
        let now = Utc::now();
        let cutoff = now
            .checked_sub_months(Months::new(years.saturating_mul(12)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let deleted = self.pipeline.store().delete_older_than(cutoff).await;
        info!(deleted, cutoff = %cutoff, "Retention cleanup complete");

        let mut state = self.state();
        state.last_cleanup_time = Some(now);
        state.last_cleanup_deleted = Some(deleted);
        Some(deleted)
    }

    /// Run both jobs until `shutdown` fires. The first refresh starts immediately.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut refresh = tokio::time::interval(self.config.refresh_interval());
            refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                refresh_hours = self.config.refresh_interval_hours,
                cleanup_hour = self.config.cleanup_hour,
                "Scheduler started"
            );

            loop {
                let cleanup_in =
                    until_next_cleanup(Local::now().naive_local(), self.config.cleanup_hour);

                // Jobs run in their own tasks so neither blocks the other
                tokio::select! {
                    _ = refresh.tick() => {
                        let scheduler = Arc::clone(&self);
                        tokio::spawn(async move {
                            scheduler.run_refresh_now().await;
                        });
                    }
                    _ = tokio::time::sleep(cleanup_in) => {
                        let scheduler = Arc::clone(&self);
                        tokio::spawn(async move {
                            scheduler.run_cleanup().await;
                        });
                    }
                    _ = shutdown.recv() => {
                        info!("Scheduler stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Time from `now` until the next `hour:00` local time.
fn until_next_cleanup(now: NaiveDateTime, hour: u32) -> Duration {
    let Some(today) = now.date().and_hms_opt(hour, 0, 0) else {
        return CLEANUP_RETRY;
    };
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(CLEANUP_RETRY)
}
