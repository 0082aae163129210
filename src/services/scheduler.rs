//! Recurring collection job.
//!
//! Lifecycle: `Idle -> Running -> PassInProgress -> (Running | RetryScheduled)
//! -> ... -> Stopped`.
//!
//! - An interval timer fires once at start and then every `interval`,
//!   aligned to the start of the schedule. Ticks that come due while a pass
//!   is running are delivered once afterwards.
//! - A recoverable pass failure arms a one-shot retry after `retry_delay`.
//!   The interval keeps ticking; a newer failure replaces the pending retry.
//! - Any other failure stops the scheduler and is returned from `run`.
//! - Passes run inside the scheduler loop, one at a time.
//! - State is in-memory (`Arc<RwLock<SchedulerState>>`) and read by the
//!   status endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use utoipa::ToSchema;

use crate::errors::CollectorError;
use crate::services::cities::CityBootstrap;
use crate::services::collector::{Collector, PassOutcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub retry_delay: Duration,
    /// Stop after this many passes (successful or not). `None` runs forever.
    pub repeats: Option<u32>,
    /// Seed the city list before the first pass.
    pub initial: bool,
    /// Delete existing cities when seeding.
    pub replace_cities: bool,
}

// ---------------------------------------------------------------------------
// Scheduler state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    Running,
    PassInProgress,
    RetryScheduled,
    Stopped,
}

/// Scheduler state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulerState {
    pub phase: SchedulerPhase,
    /// Passes run so far, failed ones included.
    pub passes: u32,
    pub repeats: Option<u32>,
    pub successful_passes: u32,
    pub failed_passes: u32,
    pub measurements_stored: u64,
    pub retry_at: Option<DateTime<Utc>>,
    pub last_pass_started_at: Option<DateTime<Utc>>,
    pub last_pass_completed_at: Option<DateTime<Utc>>,
    pub last_pass_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    /// Cities skipped by the last successful pass.
    pub last_skipped: Vec<String>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            passes: 0,
            repeats: None,
            successful_passes: 0,
            failed_passes: 0,
            measurements_stored: 0,
            retry_at: None,
            last_pass_started_at: None,
            last_pass_completed_at: None,
            last_pass_duration_ms: None,
            last_error: None,
            last_skipped: Vec::new(),
        }
    }
}

/// Shared scheduler state handle.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Totals returned by [`Scheduler::run`] once it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub passes: u32,
    pub successful_passes: u32,
    pub failed_passes: u32,
    pub measurements_stored: u64,
}

/// Asks a running scheduler to stop after the pass in flight, if any.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

enum Trigger {
    Interval,
    Retry,
}

pub struct Scheduler {
    config: SchedulerConfig,
    collector: Collector,
    bootstrap: Option<CityBootstrap>,
    state: SharedSchedulerState,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        collector: Collector,
        bootstrap: Option<CityBootstrap>,
        state: SharedSchedulerState,
    ) -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        let scheduler = Self {
            config,
            collector,
            bootstrap,
            state,
            shutdown: rx,
        };
        (scheduler, ShutdownHandle(Arc::new(tx)))
    }

    /// Run until the repeat bound is reached, shutdown is requested or a
    /// non-recoverable error occurs.
    pub async fn run(mut self) -> Result<SchedulerSummary, CollectorError> {
        {
            let mut s = self.state.write().await;
            s.phase = SchedulerPhase::Running;
            s.repeats = self.config.repeats;
        }
        tracing::info!(
            "Scheduler started: interval {:?}, retry delay {:?}, repeats {:?}",
            self.config.interval,
            self.config.retry_delay,
            self.config.repeats
        );

        if self.config.initial {
            if let Err(e) = self.seed_cities().await {
                tracing::error!("Initial city import failed, stopping: {}", e);
                self.stop(Some(&e)).await;
                return Err(e);
            }
        }

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut retry_at: Option<Instant> = None;
        let mut shutdown_open = true;

        loop {
            if *self.shutdown.borrow() {
                tracing::info!("Shutdown requested, stopping scheduler");
                break;
            }

            let trigger = tokio::select! {
                biased;
                changed = self.shutdown.changed(), if shutdown_open => {
                    // A dropped handle only means nobody can ask us to stop.
                    if changed.is_err() {
                        shutdown_open = false;
                    }
                    continue;
                }
                _ = interval.tick() => Trigger::Interval,
                _ = wait_for_retry(retry_at) => {
                    retry_at = None;
                    Trigger::Retry
                }
            };

            if matches!(trigger, Trigger::Retry) {
                tracing::info!("Running retry pass");
            }

            let result = self.run_one_pass().await;
            let passes = self.state.read().await.passes;

            match result {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::error!("Collection pass {} failed: {}", passes, e);
                    if !self.bound_reached(passes) {
                        if retry_at.is_some() {
                            tracing::debug!("Replacing pending retry");
                        }
                        retry_at = Some(Instant::now() + self.config.retry_delay);
                        tracing::info!(
                            "Retrying in {:?} because of: {}",
                            self.config.retry_delay,
                            e
                        );
                        let mut s = self.state.write().await;
                        s.retry_at = Some(Utc::now() + to_chrono(self.config.retry_delay));
                    }
                }
                Err(e) => {
                    tracing::error!("Collection pass {} failed fatally, stopping: {}", passes, e);
                    self.stop(Some(&e)).await;
                    return Err(e);
                }
            }

            {
                let mut s = self.state.write().await;
                if retry_at.is_none() {
                    s.retry_at = None;
                }
                s.phase = if retry_at.is_some() {
                    SchedulerPhase::RetryScheduled
                } else {
                    SchedulerPhase::Running
                };
            }

            if self.bound_reached(passes) {
                tracing::info!("Reached {} passes, stopping scheduler", passes);
                break;
            }
        }

        self.stop(None).await;
        Ok(self.summary().await)
    }

    async fn seed_cities(&self) -> Result<usize, CollectorError> {
        let Some(bootstrap) = &self.bootstrap else {
            return Err(CollectorError::Config(
                "initial city import requested without a city source".to_string(),
            ));
        };
        bootstrap.bootstrap(self.config.replace_cities).await
    }

    /// Run one pass and record its result in the shared state.
    async fn run_one_pass(&self) -> Result<PassOutcome, CollectorError> {
        let started_at = Utc::now();
        {
            let mut s = self.state.write().await;
            s.phase = SchedulerPhase::PassInProgress;
            s.last_pass_started_at = Some(started_at);
        }

        let result = self.collector.run_pass().await;

        let completed_at = Utc::now();
        let mut s = self.state.write().await;
        s.passes += 1;
        s.last_pass_completed_at = Some(completed_at);
        s.last_pass_duration_ms = Some((completed_at - started_at).num_milliseconds().max(0) as u64);
        match &result {
            Ok(outcome) => {
                s.successful_passes += 1;
                s.measurements_stored += outcome.stored as u64;
                s.last_skipped = outcome.skipped.clone();
                s.last_error = None;
                tracing::info!(
                    "Collection pass {} complete: {} measurements for {} cities",
                    s.passes,
                    outcome.stored,
                    outcome.cities
                );
            }
            Err(e) => {
                s.failed_passes += 1;
                s.last_error = Some(e.to_string());
            }
        }
        result
    }

    fn bound_reached(&self, passes: u32) -> bool {
        self.config.repeats.is_some_and(|limit| passes >= limit)
    }

    async fn stop(&self, error: Option<&CollectorError>) {
        let mut s = self.state.write().await;
        s.phase = SchedulerPhase::Stopped;
        s.retry_at = None;
        if let Some(e) = error {
            s.last_error = Some(e.to_string());
        }
    }

    async fn summary(&self) -> SchedulerSummary {
        let s = self.state.read().await;
        SchedulerSummary {
            passes: s.passes,
            successful_passes: s.successful_passes,
            failed_passes: s.failed_passes,
            measurements_stored: s.measurements_stored,
        }
    }
}

async fn wait_for_retry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis().min(i64::MAX as u128) as i64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
