//! mcp-stress: concurrent load generation for MCP servers.
//!
//! Loads a TOML run configuration, drives the load test engine, prints a
//! terminal summary, and optionally writes a JSON report.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use mcp_stress::config::RunConfig;
use mcp_stress::engine::LoadTestEngine;
use mcp_stress::report::{render_summary, write_report, RunReport};

/// Generate concurrent tool-call load against an MCP server.
#[derive(Parser)]
#[command(name = "mcp-stress", version)]
#[command(about = "Generate concurrent tool-call load against an MCP server")]
struct Cli {
    /// Path to the TOML run configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Write the JSON results report to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the configured number of concurrent workers
    #[arg(long)]
    vus: Option<u32>,

    /// Override the configured duration in seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = RunConfig::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {e}", cli.config.display()))?;
    apply_overrides(&mut config, cli.vus, cli.duration);

    let engine = LoadTestEngine::new(config);
    let summary = engine
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Load test failed: {e}"))?;

    if cli.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&summary, engine.config()));

    if let Some(path) = cli.output {
        let report = RunReport::new(engine.config(), &summary);
        match write_report(&report, &path) {
            Ok(written) => eprintln!("Report written to: {}", written.display()),
            Err(e) => {
                // Non-fatal -- the test itself completed.
                eprintln!("Warning: failed to write report: {e}");
            },
        }
    }

    Ok(())
}

/// Applies CLI flag overrides to a loaded config.
fn apply_overrides(config: &mut RunConfig, vus: Option<u32>, duration: Option<u64>) {
    if let Some(v) = vus {
        config.test.concurrent_requests = v;
    }
    if let Some(d) = duration {
        config.test.duration_seconds = d;
    }
}

/// Initializes the tracing subscriber on stderr.
///
/// `RUST_LOG` takes precedence; otherwise `--verbose` selects debug level.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
