//! Worker task loop for load test execution.
//!
//! Each worker independently expands the argument template, invokes the
//! configured tool, and reports every outcome as a [`StatsEvent`] through the
//! bounded mpsc channel. Cancellation is cooperative: the stop signal is
//! observed at the top of the loop and in-flight invocations always complete.
//!
//! Session handling follows the configured mode: a shared-session worker
//! opens one session before its loop and holds it until exit; a per-request
//! worker opens and releases a fresh session every iteration. Nothing is
//! retried -- a shared-session worker whose session is lost (connect failure,
//! connection drop, timeout) records the failure and leaves the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{self, McpSession};
use crate::config::RunConfig;
use crate::error::McpError;
use crate::stats::StatsEvent;
use crate::variables::VariableExpander;

/// Fixed pause between iterations. Bounds a single worker's request rate and
/// keeps the loop from spinning between short calls.
pub(crate) const REQUEST_THROTTLE: Duration = Duration::from_millis(10);

/// Main worker task.
///
/// The worker id is used only in diagnostic labels; it has no effect on
/// behavior.
pub async fn worker_loop(
    worker_id: u32,
    config: Arc<RunConfig>,
    expander: Arc<VariableExpander>,
    events: mpsc::Sender<StatsEvent>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "worker started");
    if config.test.shared_session {
        run_shared(worker_id, &config, &expander, &events, &cancel).await;
    } else {
        run_per_request(worker_id, &config, &expander, &events, &cancel).await;
    }
    debug!(worker_id, "worker stopped");
}

/// Shared-session mode: one session for the worker's whole lifetime.
async fn run_shared(
    worker_id: u32,
    config: &RunConfig,
    expander: &VariableExpander,
    events: &mpsc::Sender<StatsEvent>,
    cancel: &CancellationToken,
) {
    let Some(mut session) = establish_session(worker_id, config, events).await else {
        // Establishment failure was recorded; this worker is done.
        return;
    };

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = perform_call(config, expander, events, cancel, session.as_mut()).await;
        if let CallOutcome::SessionLost = outcome {
            warn!(worker_id, "session lost, worker leaving the run");
            break;
        }
        if !throttle(cancel).await {
            break;
        }
    }

    session.close().await;
}

/// Per-request mode: connect, call once, release, every iteration.
async fn run_per_request(
    worker_id: u32,
    config: &RunConfig,
    expander: &VariableExpander,
    events: &mpsc::Sender<StatsEvent>,
    cancel: &CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Some(mut session) = establish_session(worker_id, config, events).await {
            let _ = perform_call(config, expander, events, cancel, session.as_mut()).await;
            session.close().await;
        }
        if !throttle(cancel).await {
            break;
        }
    }
}

/// Connects and initializes a session, recording the outcome.
///
/// On failure a single no-latency failure record is emitted and `None` is
/// returned; the caller decides whether to continue (per-request) or leave
/// (shared).
async fn establish_session(
    worker_id: u32,
    config: &RunConfig,
    events: &mpsc::Sender<StatsEvent>,
) -> Option<Box<dyn McpSession>> {
    match client::connect(&config.server).await {
        Ok(session) => {
            let _ = events.send(StatsEvent::SessionCreated).await;
            Some(session)
        },
        Err(err) => {
            warn!(worker_id, error = %err, "session establishment failed");
            let _ = events
                .send(StatsEvent::Failure {
                    label: connect_failure_label(worker_id, &err),
                    latency: None,
                })
                .await;
            None
        },
    }
}

/// Result of one invocation attempt, from the session's point of view.
enum CallOutcome {
    /// The session is still usable (success or a request-level error).
    Usable,
    /// The session is gone (connection drop or timeout).
    SessionLost,
}

/// Expands arguments, performs one timed invocation, and records the outcome.
async fn perform_call(
    config: &RunConfig,
    expander: &VariableExpander,
    events: &mpsc::Sender<StatsEvent>,
    cancel: &CancellationToken,
    session: &mut dyn McpSession,
) -> CallOutcome {
    let arguments = match expander.expand_arguments(&config.test.tool_args) {
        Ok(args) => args,
        Err(err) => {
            // The engine validates templates before spawning workers, so this
            // is unreachable in practice; if it does fire, stop the run
            // instead of corrupting every later sample.
            warn!(error = %err, "argument template failed to expand, stopping run");
            cancel.cancel();
            return CallOutcome::SessionLost;
        },
    };

    let start = Instant::now();
    let result = tokio::time::timeout(
        config.server.request_timeout(),
        session.call_tool(&config.test.tool_name, arguments),
    )
    .await;
    let latency = start.elapsed();

    match result {
        Ok(Ok(_)) => {
            let _ = events.send(StatsEvent::Success { latency }).await;
            CallOutcome::Usable
        },
        Ok(Err(err)) => {
            let fatal = is_session_fatal(&err);
            let _ = events
                .send(StatsEvent::Failure {
                    label: err.to_string(),
                    latency: Some(latency),
                })
                .await;
            if fatal {
                CallOutcome::SessionLost
            } else {
                CallOutcome::Usable
            }
        },
        Err(_elapsed) => {
            let _ = events
                .send(StatsEvent::Failure {
                    label: McpError::Timeout.to_string(),
                    latency: Some(latency),
                })
                .await;
            CallOutcome::SessionLost
        },
    }
}

/// Returns `true` if the error means the session cannot serve further calls.
fn is_session_fatal(err: &McpError) -> bool {
    matches!(err, McpError::Connection { .. } | McpError::Timeout)
}

/// Diagnostic label for a failed session establishment.
fn connect_failure_label(worker_id: u32, err: &McpError) -> String {
    format!("worker {worker_id}: {err}")
}

/// Sleeps the throttle interval, racing the stop signal.
///
/// Returns `false` when the signal fired during the pause.
async fn throttle(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(REQUEST_THROTTLE) => true,
        _ = cancel.cancelled() => false,
    }
}
