//! Results persistence and terminal summary rendering.
//!
//! [`RunReport`] is the self-contained JSON artifact: anyone reading just the
//! file can see what was run and what happened. [`render_summary`] is a pure
//! function producing the human-readable dotted-row block; color is applied
//! via the `colored` crate and respects the global override set when
//! `--no-color` is active or stdout is piped.

use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;

use crate::config::RunConfig;
use crate::stats::RunSummary;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 28;

/// Self-contained JSON report of a completed run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// ISO-8601 timestamp when the report was generated.
    pub timestamp: String,
    /// The full configuration the run executed with.
    pub config: &'a RunConfig,
    /// The derived summary.
    pub results: &'a RunSummary,
}

impl<'a> RunReport<'a> {
    /// Builds a report stamped with the current time.
    pub fn new(config: &'a RunConfig, results: &'a RunSummary) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            config,
            results,
        }
    }
}

/// Writes the report as pretty JSON. Returns the path written.
pub fn write_report(report: &RunReport<'_>, path: &Path) -> std::io::Result<PathBuf> {
    let mut json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    json.push('\n');
    std::fs::write(path, json)?;
    Ok(path.to_path_buf())
}

/// Renders the k6-style terminal summary block.
pub fn render_summary(summary: &RunSummary, config: &RunConfig) -> String {
    let mut lines = Vec::new();

    lines.push(String::new());
    lines.push(format!(
        "  target:   {}://{}",
        config.server.transport,
        target_label(config)
    ));
    lines.push(format!("  tool:     {}", config.test.tool_name));
    lines.push(format!(
        "  workers:  {}  ({})",
        config.test.concurrent_requests,
        if config.test.shared_session {
            "shared session"
        } else {
            "session per request"
        }
    ));
    lines.push(format!("  duration: {}s", config.test.duration_seconds));
    lines.push(String::new());

    lines.push(metric_row(
        "requests_sent",
        &summary.requests_sent.to_string(),
    ));
    lines.push(metric_row(
        "requests_received",
        &summary.requests_received.to_string(),
    ));
    lines.push(metric_row(
        "successes",
        &summary.successes.to_string().green().to_string(),
    ));
    let failures_value = if summary.failures > 0 {
        summary.failures.to_string().red().to_string()
    } else {
        summary.failures.to_string()
    };
    lines.push(metric_row("failures", &failures_value));
    lines.push(metric_row(
        "sessions_created",
        &summary.sessions_created.to_string(),
    ));
    lines.push(metric_row(
        "response_time_min",
        &format!("{:.1}ms", summary.response_times.min_ms),
    ));
    lines.push(metric_row(
        "response_time_max",
        &format!("{:.1}ms", summary.response_times.max_ms),
    ));
    lines.push(metric_row(
        "response_time_avg",
        &format!("{:.1}ms", summary.response_times.avg_ms),
    ));

    if let Some(execution) = &summary.execution_time {
        lines.push(metric_row(
            "elapsed",
            &format!("{:.1}s", execution.total_seconds),
        ));
    }
    if let Some(throughput) = &summary.throughput {
        lines.push(metric_row(
            "requests_per_second",
            &format!("{:.2}", throughput.requests_per_second)
                .green()
                .to_string(),
        ));
        lines.push(metric_row(
            "successes_per_second",
            &format!("{:.2}", throughput.successes_per_second),
        ));
    }

    if let Some(table) = &summary.error_summary {
        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut entries: Vec<_> = table.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (label, count) in entries {
            lines.push(format!("    {}: {}", label.red(), count));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Formats a `name.....: value` row with dotted padding.
fn metric_row(name: &str, value: &str) -> String {
    let dots = PAD_WIDTH.saturating_sub(name.len());
    format!("  {}{}: {}", name, ".".repeat(dots), value)
}

/// Target portion of the header line: command for stdio, URL otherwise.
fn target_label(config: &RunConfig) -> String {
    match config.server.transport {
        crate::config::Transport::Stdio => config.server.host.clone(),
        _ => {
            let url = config.server.endpoint_url();
            url.trim_start_matches("http://").to_string()
        },
    }
}
