//! Background refresh of tracked cities.
//!
//! One tokio task wakes every `period`, collects the cities whose data is
//! older than the freshness window and refetches them concurrently. A
//! failed refresh leaves the city's timestamp alone so the next tick
//! retries it.

use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skyboard_core::config::MAX_REFRESH_INTERVAL_SECS;
use skyboard_core::Preferences;

use crate::error::WeatherError;
use crate::orchestrator::FetchOrchestrator;
use crate::types::Units;

/// Shortest and longest accepted tick periods.
const MIN_PERIOD: Duration = Duration::from_secs(1);
const MAX_PERIOD: Duration = Duration::from_secs(MAX_REFRESH_INTERVAL_SECS);

/// Outcome of one refresh pass.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<(String, WeatherError)>,
}

impl RefreshReport {
    pub fn is_empty(&self) -> bool {
        self.refreshed.is_empty() && self.failed.is_empty()
    }
}

/// The work done on each tick, shared between the task and `tick_once`.
struct RefreshPass {
    orchestrator: Arc<FetchOrchestrator>,
    preferences: Preferences,
    default_units: Units,
    window: ChronoDuration,
}

impl RefreshPass {
    async fn run(&self) -> RefreshReport {
        let stale = self.orchestrator.store().stale_cities(self.window);
        if stale.is_empty() {
            debug!("Refresh tick: nothing stale");
            return RefreshReport::default();
        }

        // Read per tick so a unit change applies from the next refresh on
        let units = self.preferences.units(self.default_units);
        debug!(count = stale.len(), units = %units, "Refresh tick: refreshing stale cities");

        let outcomes = join_all(stale.into_iter().map(|city| async move {
            let result = self.orchestrator.refresh_city(&city, units).await;
            (city, result)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (city, result) in outcomes {
            match result {
                Ok(true) => report.refreshed.push(city),
                Ok(false) => debug!(city = %city, "Removed during refresh"),
                Err(e) => {
                    warn!(city = %city, error = %e, "Background refresh failed");
                    report.failed.push((city, e));
                }
            }
        }
        report
    }
}

/// Handle to the running refresh task.
pub struct RefreshScheduler {
    pass: Arc<RefreshPass>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("window", &self.pass.window)
            .field("running", &self.is_running())
            .finish()
    }
}

impl RefreshScheduler {
    /// Spawn the refresh loop. Must be called inside a tokio runtime.
    ///
    /// The first tick fires one `period` after start. The period is
    /// clamped to between one second and one day.
    pub fn start(
        orchestrator: Arc<FetchOrchestrator>,
        preferences: Preferences,
        default_units: Units,
        period: Duration,
        window: ChronoDuration,
    ) -> Self {
        let pass = Arc::new(RefreshPass {
            orchestrator,
            preferences,
            default_units,
            window,
        });
        let cancel = CancellationToken::new();

        let clamped = period.clamp(MIN_PERIOD, MAX_PERIOD);
        if clamped != period {
            warn!(
                requested_secs = period.as_secs(),
                period_secs = clamped.as_secs(),
                "Refresh period out of range, clamped"
            );
        }
        let period = clamped;
        let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task_pass = Arc::clone(&pass);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "Refresh scheduler started");
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // A tick in progress is abandoned on shutdown
                        tokio::select! {
                            _ = task_cancel.cancelled() => break,
                            report = task_pass.run() => {
                                if !report.is_empty() {
                                    debug!(
                                        refreshed = report.refreshed.len(),
                                        failed = report.failed.len(),
                                        "Refresh tick complete"
                                    );
                                }
                            }
                        }
                    }
                }
            }
            info!("Refresh scheduler stopped");
        });

        Self {
            pass,
            cancel,
            handle: Some(handle),
        }
    }

    /// Run one refresh pass immediately, outside the timer.
    pub async fn tick_once(&self) -> RefreshReport {
        self.pass.run().await
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for the task to exit.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Refresh task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
