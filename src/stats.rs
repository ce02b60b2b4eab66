//! Run statistics accumulation and summary derivation.
//!
//! [`RunStats`] is a single-owner accumulator: workers never touch it
//! directly. They emit [`StatsEvent`] values through a bounded mpsc channel
//! and one aggregator task applies them, so concurrent writers are fully
//! serialized and no update is lost.
//!
//! After every applied event the invariants hold:
//!
//! - `requests_sent == successes + failures`
//! - `requests_received <= requests_sent`
//! - `latencies.len() == requests_received`
//! - `errors.len() == failures`
//!
//! [`RunStats::summarize`] derives the final [`RunSummary`] once, after all
//! workers have joined.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

/// A single worker-observed outcome, funneled to the aggregator task.
#[derive(Debug, Clone)]
pub enum StatsEvent {
    /// A tool invocation completed without error.
    Success {
        /// Measured wall-clock duration of the invocation.
        latency: Duration,
    },
    /// A tool invocation or session establishment failed.
    Failure {
        /// Textual description of the failure, used for the frequency table.
        label: String,
        /// Measured duration, when the failure happened after a timed call.
        /// `None` for failures with nothing to time (e.g. connect errors).
        latency: Option<Duration>,
    },
    /// An invocation session was successfully established.
    SessionCreated,
}

/// Mutable aggregate for one load test run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Total requests attempted (successes + failures).
    pub requests_sent: u64,
    /// Requests that produced any timed outcome.
    pub requests_received: u64,
    /// Requests that completed without error.
    pub successes: u64,
    /// Requests that failed.
    pub failures: u64,
    /// Sessions opened over the run.
    pub sessions_created: u64,
    latencies: Vec<f64>,
    errors: Vec<String>,
    start_time: Option<f64>,
    end_time: Option<f64>,
}

impl RunStats {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful request with its latency in seconds.
    pub fn record_success(&mut self, latency_secs: f64) {
        self.requests_sent += 1;
        self.requests_received += 1;
        self.successes += 1;
        self.latencies.push(latency_secs);
    }

    /// Records a failed request.
    ///
    /// When a latency is supplied the request also counts as received and
    /// contributes a latency sample; without one (e.g. the failure happened
    /// before a response could be timed) it contributes none.
    pub fn record_failure(&mut self, label: impl Into<String>, latency_secs: Option<f64>) {
        self.requests_sent += 1;
        self.failures += 1;
        self.errors.push(label.into());
        if let Some(latency) = latency_secs {
            self.requests_received += 1;
            self.latencies.push(latency);
        }
    }

    /// Records one established invocation session.
    pub fn record_session_created(&mut self) {
        self.sessions_created += 1;
    }

    /// Applies one worker event.
    pub fn apply(&mut self, event: StatsEvent) {
        match event {
            StatsEvent::Success { latency } => self.record_success(latency.as_secs_f64()),
            StatsEvent::Failure { label, latency } => {
                self.record_failure(label, latency.map(|l| l.as_secs_f64()));
            },
            StatsEvent::SessionCreated => self.record_session_created(),
        }
    }

    /// Records the run start timestamp (epoch seconds). Set once; later
    /// calls are ignored.
    pub fn mark_started(&mut self, epoch_secs: f64) {
        if self.start_time.is_none() {
            self.start_time = Some(epoch_secs);
        }
    }

    /// Records the run end timestamp (epoch seconds). Set once; later calls
    /// are ignored.
    pub fn mark_finished(&mut self, epoch_secs: f64) {
        if self.end_time.is_none() {
            self.end_time = Some(epoch_secs);
        }
    }

    /// Observed latencies in seconds, in recording order.
    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    /// Error labels in recording order, one per failure.
    pub fn error_labels(&self) -> &[String] {
        &self.errors
    }

    /// Derives the summary. Called once after all workers have joined;
    /// the accumulator is read-only from then on.
    pub fn summarize(&self) -> RunSummary {
        let response_times = if self.latencies.is_empty() {
            ResponseTimes {
                min_ms: 0.0,
                max_ms: 0.0,
                avg_ms: 0.0,
            }
        } else {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut sum = 0.0;
            for &latency in &self.latencies {
                min = min.min(latency);
                max = max.max(latency);
                sum += latency;
            }
            ResponseTimes {
                min_ms: min * 1000.0,
                max_ms: max * 1000.0,
                avg_ms: sum / self.latencies.len() as f64 * 1000.0,
            }
        };

        let error_summary = if self.failures > 0 {
            let mut table = BTreeMap::new();
            for label in &self.errors {
                *table.entry(label.clone()).or_insert(0u64) += 1;
            }
            Some(table)
        } else {
            None
        };

        let (execution_time, throughput) = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => {
                let total_seconds = end - start;
                let execution_time = ExecutionTime {
                    total_seconds,
                    start_time: start,
                    end_time: end,
                };
                let throughput = (total_seconds > 0.0).then(|| Throughput {
                    requests_per_second: round2(self.requests_sent as f64 / total_seconds),
                    successes_per_second: round2(self.successes as f64 / total_seconds),
                });
                (Some(execution_time), throughput)
            },
            _ => (None, None),
        };

        RunSummary {
            requests_sent: self.requests_sent,
            requests_received: self.requests_received,
            successes: self.successes,
            failures: self.failures,
            sessions_created: self.sessions_created,
            response_times,
            error_summary,
            execution_time,
            throughput,
        }
    }
}

/// Latency extremes and mean in milliseconds. All zero when no request
/// produced a timed outcome.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseTimes {
    /// Minimum observed latency.
    pub min_ms: f64,
    /// Maximum observed latency.
    pub max_ms: f64,
    /// Arithmetic mean latency, no outlier trimming.
    pub avg_ms: f64,
}

/// Wall-clock bounds of the run, epoch seconds.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionTime {
    /// `end_time - start_time`.
    pub total_seconds: f64,
    /// When the run entered its running phase.
    pub start_time: f64,
    /// When the last worker had joined.
    pub end_time: f64,
}

/// Requests and successes per second of elapsed wall time, rounded to two
/// decimal places.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Throughput {
    /// All requests (successes + failures) per second.
    pub requests_per_second: f64,
    /// Successful requests per second.
    pub successes_per_second: f64,
}

/// Final summary of a completed run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    /// Total requests attempted.
    pub requests_sent: u64,
    /// Requests with a timed outcome.
    pub requests_received: u64,
    /// Successful requests.
    pub successes: u64,
    /// Failed requests.
    pub failures: u64,
    /// Sessions opened over the run.
    pub sessions_created: u64,
    /// Latency extremes and mean.
    pub response_times: ResponseTimes,
    /// Failure label frequency table; absent when no request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<BTreeMap<String, u64>>,
    /// Wall-clock bounds; absent unless both timestamps were recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<ExecutionTime>,
    /// Per-second rates; absent unless elapsed time is strictly positive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<Throughput>,
}

/// Rounds to two decimal places, half away from zero.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(stats: &RunStats) {
        assert_eq!(stats.requests_sent, stats.successes + stats.failures);
        assert!(stats.requests_received <= stats.requests_sent);
        assert_eq!(stats.latencies().len() as u64, stats.requests_received);
        assert_eq!(stats.error_labels().len() as u64, stats.failures);
    }

    #[test]
    fn test_record_success_counts() {
        let mut stats = RunStats::new();
        stats.record_success(0.05);
        stats.record_success(0.07);
        assert_eq!(stats.requests_sent, 2);
        assert_eq!(stats.requests_received, 2);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 0);
        assert_invariants(&stats);
    }

    #[test]
    fn test_record_failure_with_latency_counts_as_received() {
        let mut stats = RunStats::new();
        stats.record_failure("boom", Some(0.2));
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.requests_received, 1);
        assert_eq!(stats.failures, 1);
        assert_invariants(&stats);
    }

    #[test]
    fn test_record_failure_without_latency_contributes_no_sample() {
        let mut stats = RunStats::new();
        stats.record_failure("connect refused", None);
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.requests_received, 0);
        assert!(stats.latencies().is_empty());
        assert_invariants(&stats);
    }

    #[test]
    fn test_empty_stats_summary_reports_zeros_and_omits_timing() {
        let stats = RunStats::new();
        let summary = stats.summarize();
        assert_eq!(summary.response_times.min_ms, 0.0);
        assert_eq!(summary.response_times.max_ms, 0.0);
        assert_eq!(summary.response_times.avg_ms, 0.0);
        assert!(summary.error_summary.is_none());
        assert!(summary.execution_time.is_none());
        assert!(summary.throughput.is_none());
    }

    #[test]
    fn test_response_time_derivation() {
        let mut stats = RunStats::new();
        stats.record_success(0.1);
        stats.record_success(0.3);
        stats.record_failure("boom", Some(0.2));
        let summary = stats.summarize();
        assert_eq!(summary.response_times.min_ms, 100.0);
        assert_eq!(summary.response_times.max_ms, 300.0);
        assert!((summary.response_times.avg_ms - 200.0).abs() < 1e-9);
        let table = summary.error_summary.unwrap();
        assert_eq!(table.get("boom"), Some(&1));
    }

    #[test]
    fn test_throughput_rounding() {
        let mut stats = RunStats::new();
        stats.record_success(0.01);
        stats.record_success(0.01);
        stats.mark_started(1000.0);
        stats.mark_finished(1005.5);
        let summary = stats.summarize();
        let execution = summary.execution_time.unwrap();
        assert!((execution.total_seconds - 5.5).abs() < 1e-9);
        assert_eq!(execution.start_time, 1000.0);
        assert_eq!(execution.end_time, 1005.5);
        let throughput = summary.throughput.unwrap();
        assert_eq!(throughput.requests_per_second, 0.36);
        assert_eq!(throughput.successes_per_second, 0.36);
    }

    #[test]
    fn test_throughput_omitted_for_zero_elapsed() {
        let mut stats = RunStats::new();
        stats.record_success(0.01);
        stats.mark_started(1000.0);
        stats.mark_finished(1000.0);
        let summary = stats.summarize();
        assert!(summary.execution_time.is_some());
        assert!(summary.throughput.is_none());
    }

    #[test]
    fn test_timestamps_set_once() {
        let mut stats = RunStats::new();
        stats.mark_started(10.0);
        stats.mark_started(99.0);
        stats.mark_finished(20.0);
        stats.mark_finished(99.0);
        let summary = stats.summarize();
        let execution = summary.execution_time.unwrap();
        assert_eq!(execution.start_time, 10.0);
        assert_eq!(execution.end_time, 20.0);
        assert!((execution.total_seconds - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_summary_frequency_table() {
        let mut stats = RunStats::new();
        stats.record_failure("timeout", None);
        stats.record_failure("timeout", Some(0.5));
        stats.record_failure("refused", None);
        let summary = stats.summarize();
        let table = summary.error_summary.unwrap();
        assert_eq!(table.get("timeout"), Some(&2));
        assert_eq!(table.get("refused"), Some(&1));
        assert_invariants(&stats);
    }

    #[test]
    fn test_apply_events_matches_direct_recording() {
        let mut stats = RunStats::new();
        stats.apply(StatsEvent::SessionCreated);
        stats.apply(StatsEvent::Success {
            latency: Duration::from_millis(50),
        });
        stats.apply(StatsEvent::Failure {
            label: "boom".to_string(),
            latency: None,
        });
        stats.apply(StatsEvent::Failure {
            label: "slow".to_string(),
            latency: Some(Duration::from_millis(250)),
        });
        assert_eq!(stats.sessions_created, 1);
        assert_eq!(stats.requests_sent, 3);
        assert_eq!(stats.requests_received, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 2);
        assert_invariants(&stats);
    }

    #[test]
    fn test_summary_serialization_omits_absent_groups() {
        let stats = RunStats::new();
        let json = serde_json::to_value(stats.summarize()).unwrap();
        assert!(json.get("error_summary").is_none());
        assert!(json.get("execution_time").is_none());
        assert!(json.get("throughput").is_none());
        assert_eq!(json["requests_sent"], 0);
        assert_eq!(json["response_times"]["min_ms"], 0.0);
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(-0.375), -0.38);
        assert_eq!(round2(2.0 / 5.5), 0.36);
        assert_eq!(round2(10.0), 10.0);
    }
}
