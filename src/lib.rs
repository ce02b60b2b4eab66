//! Load-generation engine for MCP servers.
//!
//! `mcp-stress` drives concurrent tool invocations against an MCP server for
//! a fixed wall-clock duration and reports throughput, latency, and error
//! statistics. Three transports are supported: stdio (spawned child
//! process), legacy HTTP+SSE, and streamable HTTP.
//!
//! # Architecture
//!
//! - [`config`] -- typed TOML run configuration
//! - [`variables`] -- `{{...}}` template expansion for per-call argument
//!   variation (timestamps, a shared monotonic counter, random integers)
//! - [`client`] -- MCP sessions: the connect/call/close capability behind a
//!   transport factory
//! - [`worker`] -- the per-worker invocation loop with cooperative shutdown
//! - [`stats`] -- channel-funneled outcome aggregation and the run summary
//! - [`engine`] -- the orchestrator tying it all together
//! - [`report`] -- JSON persistence and the terminal summary

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod report;
pub mod stats;
pub mod variables;
pub mod worker;

pub use config::RunConfig;
pub use engine::LoadTestEngine;
pub use error::{LoadTestError, McpError, TemplateError};
pub use stats::{RunStats, RunSummary};
pub use variables::VariableExpander;
