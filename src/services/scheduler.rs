// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Time-based triggers for collection and idle tracking.
//!
//! Three cron jobs run in the configured zone:
//! - daily first run at 06:00 (previous day's data)
//! - intraday collection every 28 minutes, 06:00-22:59, skipping 06:00
//! - idle tracking every 2 minutes, skipped while a collection runs
//!
//! Exclusion is process-local: one atomic flag per run kind.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::services::collector::DataCollector;
use crate::services::tracking::IdleTracker;
use crate::time_utils::Clock;

pub const DAILY_FIRST_RUN_CRON: &str = "0 0 6 * * *";
pub const INTRADAY_COLLECTION_CRON: &str = "0 */28 6-22 * * *";
pub const IDLE_TRACKING_CRON: &str = "0 */2 * * * *";

/// How a guarded run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    /// Another run held the flag; nothing was done
    Skipped,
}

/// Holds an exclusion flag for its lifetime; releases on drop, including
/// when the run errors or panics.
struct FlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Exclusion flag state for the operator status endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchedulerStatus {
    pub collection_in_flight: bool,
    pub tracking_in_flight: bool,
}

pub struct Scheduler {
    collector: Arc<DataCollector>,
    tracker: Arc<IdleTracker>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    collection_in_flight: AtomicBool,
    tracking_in_flight: AtomicBool,
}

impl Scheduler {
    pub fn new(
        collector: Arc<DataCollector>,
        tracker: Arc<IdleTracker>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            collector,
            tracker,
            clock,
            timezone,
            collection_in_flight: AtomicBool::new(false),
            tracking_in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collection_in_flight.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            collection_in_flight: self.is_collecting(),
            tracking_in_flight: self.tracking_in_flight.load(Ordering::Acquire),
        }
    }

    /// Run one collection unless another is already in flight.
    pub async fn run_collection(&self, is_first_run: bool) -> RunOutcome {
        let Some(_guard) = FlagGuard::acquire(&self.collection_in_flight) else {
            tracing::info!(is_first_run, "Collection already in progress, skipping");
            return RunOutcome::Skipped;
        };

        match self.collector.collect(is_first_run).await {
            Ok(_) => RunOutcome::Completed,
            Err(e) => {
                tracing::error!(is_first_run, error = %e, "Data collection failed");
                RunOutcome::Failed
            }
        }
    }

    /// Run idle tracking unless a collection (or another tracking run) is in flight.
    pub async fn run_tracking(&self) -> RunOutcome {
        if self.is_collecting() {
            tracing::info!("Data collection in progress, skipping idle tracking");
            return RunOutcome::Skipped;
        }
        let Some(_guard) = FlagGuard::acquire(&self.tracking_in_flight) else {
            tracing::info!("Idle tracking already in progress, skipping");
            return RunOutcome::Skipped;
        };

        match self.tracker.track_idle_couriers().await {
            Ok(_) => RunOutcome::Completed,
            Err(e) => {
                tracing::error!(error = %e, "Idle courier tracking failed");
                RunOutcome::Failed
            }
        }
    }

    /// Start a guarded collection in the background and return at once.
    pub fn run_now(self: &Arc<Self>, is_first_run: bool) -> JoinHandle<RunOutcome> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run_collection(is_first_run).await })
    }

    /// Start a guarded tracking run in the background and return at once.
    pub fn run_tracking_now(self: &Arc<Self>) -> JoinHandle<RunOutcome> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run_tracking().await })
    }

    fn is_daily_slot(&self) -> bool {
        is_daily_slot_at(self.clock.now(), self.timezone)
    }

    /// Register the three cron jobs and start them.
    ///
    /// The returned [`JobScheduler`] must be kept alive; call `shutdown` on
    /// it to stop all triggers.
    pub async fn start(self: &Arc<Self>) -> Result<JobScheduler, JobSchedulerError> {
        let jobs = JobScheduler::new().await?;

        let scheduler = Arc::clone(self);
        let daily = Job::new_async_tz(DAILY_FIRST_RUN_CRON, self.timezone, move |_uuid, _lock| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                tracing::info!("scheduler: starting daily first run");
                scheduler.run_collection(true).await;
            })
        })?;
        jobs.add(daily).await?;

        let scheduler = Arc::clone(self);
        let intraday =
            Job::new_async_tz(INTRADAY_COLLECTION_CRON, self.timezone, move |_uuid, _lock| {
                let scheduler = Arc::clone(&scheduler);
                Box::pin(async move {
                    if scheduler.is_daily_slot() {
                        tracing::debug!("scheduler: 06:00 belongs to the daily run");
                        return;
                    }
                    scheduler.run_collection(false).await;
                })
            })?;
        jobs.add(intraday).await?;

        let scheduler = Arc::clone(self);
        let tracking = Job::new_async_tz(IDLE_TRACKING_CRON, self.timezone, move |_uuid, _lock| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                scheduler.run_tracking().await;
            })
        })?;
        jobs.add(tracking).await?;

        jobs.start().await?;
        tracing::info!(
            timezone = %self.timezone,
            daily = DAILY_FIRST_RUN_CRON,
            intraday = INTRADAY_COLLECTION_CRON,
            tracking = IDLE_TRACKING_CRON,
            "Scheduler started"
        );

        Ok(jobs)
    }
}

/// Whether an intraday trigger at `now` coincides with the daily run.
pub fn is_daily_slot_at(now: DateTime<Utc>, timezone: Tz) -> bool {
    let local = now.with_timezone(&timezone);
    local.hour() == 6 && local.minute() == 0
}
