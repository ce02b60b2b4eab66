//! Load test orchestration: worker spawning, the run timer, stats
//! aggregation, and graceful shutdown.
//!
//! [`LoadTestEngine`] owns the run lifecycle:
//! - Validates the config and the argument template (a malformed template
//!   aborts before anything spawns)
//! - Spawns N worker tasks on a [`tokio_util::task::TaskTracker`]
//! - Funnels worker outcomes through a bounded mpsc channel into a single
//!   aggregator task that owns the [`RunStats`]
//! - Arms a one-shot duration timer that fires the shared
//!   [`CancellationToken`] exactly once
//! - Drains gracefully: workers finish their current iteration, the tracker
//!   joins them all, then the aggregator is joined and the summary derived

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::RunConfig;
use crate::error::LoadTestError;
use crate::stats::{RunStats, RunSummary, StatsEvent};
use crate::variables::VariableExpander;
use crate::worker::worker_loop;

/// Top-level load test engine.
pub struct LoadTestEngine {
    config: RunConfig,
}

impl LoadTestEngine {
    /// Creates an engine for the given run configuration.
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the engine's configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the load test to completion and returns the summary.
    ///
    /// Per-request and per-connection failures are recorded, never escalated;
    /// the only early aborts are config and template errors surfaced here
    /// before any worker starts.
    pub async fn run(&self) -> Result<RunSummary, LoadTestError> {
        self.config.validate()?;

        let expander = Arc::new(VariableExpander::new());
        expander.validate(&self.config.test.tool_args)?;

        let concurrency = self.config.test.concurrent_requests;
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let buffer_size = (concurrency as usize) * 100;
        let (event_tx, event_rx) = mpsc::channel::<StatsEvent>(buffer_size);

        let mut stats = RunStats::new();
        stats.mark_started(epoch_seconds());

        info!(
            concurrency,
            duration_seconds = self.config.test.duration_seconds,
            transport = %self.config.server.transport,
            tool = %self.config.test.tool_name,
            shared_session = self.config.test.shared_session,
            "starting load test"
        );

        // The aggregator owns the stats and must outlive the workers, so it
        // is spawned directly, not on the tracker.
        let aggregator = tokio::spawn(collect_events(event_rx, stats));

        let config = Arc::new(self.config.clone());
        for worker_id in 0..concurrency {
            tracker.spawn(worker_loop(
                worker_id,
                config.clone(),
                expander.clone(),
                event_tx.clone(),
                cancel.clone(),
            ));
        }
        // Workers hold their own sender clones; dropping ours lets the
        // aggregator finish once they are all gone.
        drop(event_tx);
        tracker.close();

        let duration = self.config.duration();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                info!("duration elapsed, draining workers");
                cancel.cancel();
            }
            _ = tracker.wait() => {
                info!("all workers finished before the duration elapsed");
            }
            _ = cancel.cancelled() => {}
            _ = handle_ctrl_c(cancel.clone()) => {}
        }

        // Graceful drain: every worker completes its current iteration.
        tracker.wait().await;

        let mut stats = aggregator
            .await
            .map_err(|e| LoadTestError::Aggregation {
                message: e.to_string(),
            })?;
        stats.mark_finished(epoch_seconds());

        info!(
            requests_sent = stats.requests_sent,
            requests_received = stats.requests_received,
            successes = stats.successes,
            failures = stats.failures,
            sessions_created = stats.sessions_created,
            "load test complete"
        );

        Ok(stats.summarize())
    }
}

/// Aggregator task: the sole writer of the run's stats.
///
/// Consumes [`StatsEvent`] values until every sender is dropped, then hands
/// the accumulator back.
async fn collect_events(mut events: mpsc::Receiver<StatsEvent>, mut stats: RunStats) -> RunStats {
    while let Some(event) = events.recv().await {
        stats.apply(event);
    }
    stats
}

/// Current wall-clock time as f64 seconds since the Unix epoch.
fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C triggers graceful drain via the cancellation token.
/// Second Ctrl+C performs a hard abort via `std::process::exit(1)`.
async fn handle_ctrl_c(cancel: CancellationToken) {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl_c handler");
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl_c handler");
    eprintln!("\nReceived second Ctrl+C, aborting immediately.");
    std::process::exit(1);
}
