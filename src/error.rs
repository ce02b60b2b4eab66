//! Error types for the load-generation engine.
//!
//! Defines [`LoadTestError`] for configuration and template errors that abort
//! a run, [`TemplateError`] for malformed argument templates, and [`McpError`]
//! for MCP protocol and transport errors recorded per request.

/// Errors that abort a load test run before or during setup.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., zero concurrency, empty tool name).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// Malformed argument template. Surfaced before any worker spawns, since
    /// continuing would corrupt every subsequent sample.
    #[error("Invalid argument template: {source}")]
    Template {
        #[from]
        source: TemplateError,
    },

    /// The stats aggregation task ended abnormally.
    #[error("Stats aggregation failed: {message}")]
    Aggregation { message: String },
}

/// Fatal template expansion errors.
///
/// Only malformed `random.*` expressions are fatal; unrecognized placeholder
/// names degrade to a visible `{{unknown:<name>}}` marker instead.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The expression is not a well-formed `random.randint(min,max)` call
    /// with non-negative integer bounds.
    #[error("Invalid randint expression: {expr}")]
    InvalidRandint { expr: String },

    /// The parsed bounds form an empty range (`min > max`).
    #[error("Empty randint range in expression: {expr}")]
    EmptyRange { expr: String },
}

/// MCP protocol and transport errors encountered during load test requests.
///
/// Each variant is a distinct error category that the stats pipeline counts
/// and reports separately. None of them abort the run.
#[derive(Debug, thiserror::Error, Clone)]
pub enum McpError {
    /// JSON-RPC protocol error returned by the MCP server in the response body.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    /// HTTP transport error (4xx or 5xx status code).
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request or handshake exceeded its configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (spawn, DNS resolution, TCP connect, closed pipe).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The server sent a frame that could not be interpreted as JSON-RPC.
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl McpError {
    /// Returns the error category as a static string for classification.
    ///
    /// Categories: `"jsonrpc"`, `"http"`, `"timeout"`, `"connection"`,
    /// `"protocol"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::JsonRpc { .. } => "jsonrpc",
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Protocol { .. } => "protocol",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`McpError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}
