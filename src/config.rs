//! TOML-based run configuration.
//!
//! A run is described by a `[server]` table (where to connect and how) and a
//! `[test]` table (what to call, with how much concurrency, for how long).
//! Argument templates are arbitrary nested TOML values carried as
//! [`serde_json::Value`]; string leaves may contain `{{...}}` placeholders
//! resolved per call by the variable expander.
//!
//! # Example TOML
//!
//! ```toml
//! [server]
//! transport = "streamable_http"
//! host = "localhost"
//! port = 3000
//! path = "/mcp"
//!
//! [test]
//! tool_name = "echo"
//! tool_args = { text = "hello {{counter}}" }
//! concurrent_requests = 10
//! duration_seconds = 30
//! shared_session = true
//! ```
//!
//! For the `stdio` transport, `host` holds the command line to spawn
//! (whitespace-split into program and arguments); `port` and `path` are
//! unused.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::LoadTestError;

/// Transport used to reach the MCP server.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Spawn the server as a child process and speak newline-delimited
    /// JSON-RPC over its stdin/stdout.
    Stdio,
    /// Legacy HTTP+SSE: a long-lived event stream plus POSTed requests.
    Sse,
    /// Streamable HTTP: JSON-RPC POSTs with JSON or SSE-framed responses.
    StreamableHttp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable_http",
        };
        f.write_str(s)
    }
}

/// MCP server connection settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Transport to use.
    pub transport: Transport,
    /// Host name for HTTP transports; full command line for stdio.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port for HTTP transports.
    #[serde(default)]
    pub port: Option<u16>,
    /// URL path for HTTP transports (e.g. `/mcp` or `/sse`).
    #[serde(default)]
    pub path: Option<String>,
    /// Bound on session establishment (connect + initialize), in ms.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bound on each tool invocation, in ms.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

/// Default session-establishment bound: 10 seconds.
fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Default per-invocation bound: 30 seconds.
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ServerConfig {
    /// Endpoint URL for the HTTP transports: `http://{host}[:port][path]`.
    pub fn endpoint_url(&self) -> String {
        let port_part = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        let path_part = self.path.as_deref().unwrap_or_default();
        format!("http://{}{}{}", self.host, port_part, path_part)
    }

    /// Session-establishment bound as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-invocation bound as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Load test settings controlling what is called and how hard.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TestConfig {
    /// Name of the tool to invoke.
    pub tool_name: String,
    /// Argument template passed to every invocation, after expansion.
    #[serde(default = "default_tool_args")]
    pub tool_args: serde_json::Value,
    /// Number of concurrent workers.
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: u32,
    /// Wall-clock run duration in seconds.
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,
    /// When true, each worker opens one session and reuses it for all its
    /// requests; when false (default), a fresh session is opened per request.
    #[serde(default)]
    pub shared_session: bool,
}

fn default_tool_args() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_concurrent_requests() -> u32 {
    1
}

fn default_duration_seconds() -> u64 {
    60
}

/// Complete run configuration parsed from a TOML file.
///
/// Immutable for the lifetime of a run; the engine shares it across workers
/// behind an `Arc`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunConfig {
    /// Server connection settings.
    pub server: ServerConfig,
    /// Load test settings.
    pub test: TestConfig,
}

impl RunConfig {
    /// Parse a TOML string into a validated [`RunConfig`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`RunConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Configured run duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.test.duration_seconds)
    }

    /// Validate that the config is semantically usable.
    ///
    /// Checks:
    /// - `concurrent_requests >= 1` and `duration_seconds >= 1`
    /// - `tool_name` is non-empty
    /// - `tool_args` is a table (or absent)
    /// - stdio: `host` holds a non-empty command line
    /// - sse / streamable_http: the endpoint URL parses
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.test.concurrent_requests < 1 {
            return Err(LoadTestError::ConfigValidation {
                message: "test.concurrent_requests must be at least 1".to_string(),
            });
        }
        if self.test.duration_seconds < 1 {
            return Err(LoadTestError::ConfigValidation {
                message: "test.duration_seconds must be at least 1".to_string(),
            });
        }
        if self.test.tool_name.trim().is_empty() {
            return Err(LoadTestError::ConfigValidation {
                message: "test.tool_name must not be empty".to_string(),
            });
        }
        if !matches!(
            self.test.tool_args,
            serde_json::Value::Object(_) | serde_json::Value::Null
        ) {
            return Err(LoadTestError::ConfigValidation {
                message: "test.tool_args must be a table of arguments".to_string(),
            });
        }

        match self.server.transport {
            Transport::Stdio => {
                if self.server.host.split_whitespace().next().is_none() {
                    return Err(LoadTestError::ConfigValidation {
                        message: "server.host must hold the command to spawn for the stdio transport"
                            .to_string(),
                    });
                }
            },
            Transport::Sse | Transport::StreamableHttp => {
                let url = self.server.endpoint_url();
                if Url::parse(&url).is_err() {
                    return Err(LoadTestError::ConfigValidation {
                        message: format!("server settings produce an invalid URL: {url}"),
                    });
                }
            },
        }

        Ok(())
    }
}
