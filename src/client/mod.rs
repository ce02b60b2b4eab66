//! MCP client sessions for the supported transports.
//!
//! A session is one initialized connection to an MCP server, able to invoke
//! tools until closed. The [`McpSession`] trait is the single capability
//! surface the load workers consume: `call_tool` plus an infallible `close`.
//! [`connect`] is the factory keyed on the configured transport; it performs
//! the full connect + initialize handshake under the configured
//! establishment timeout.

pub mod sse;
pub mod stdio;
pub mod streamable_http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{ServerConfig, Transport};
use crate::error::McpError;

/// MCP protocol revision sent in the initialize handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name advertised to servers.
const CLIENT_NAME: &str = "mcp-stress";

/// A JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Builds a request carrying an id.
    pub fn call(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(params),
            id: Some(Value::from(id)),
        }
    }

    /// Builds a notification (no id, no response expected).
    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: None,
            id: None,
        }
    }

    /// Builds the MCP initialize request.
    pub fn initialize(id: u64) -> Self {
        Self::call(
            id,
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        )
    }

    /// Builds a tools/call request.
    pub fn tools_call(id: u64, tool_name: &str, arguments: Value) -> Self {
        Self::call(
            id,
            "tools/call",
            json!({
                "name": tool_name,
                "arguments": arguments,
            }),
        )
    }
}

/// A JSON-RPC 2.0 response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcResponse {
    /// True when this frame is a response (as opposed to a server-initiated
    /// request or notification that happens to deserialize).
    pub fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// True when this frame answers the request with the given id.
    pub fn answers(&self, id: Option<&Value>) -> bool {
        self.is_response() && self.id.as_ref() == id
    }

    /// Converts the frame into the result payload, mapping JSON-RPC error
    /// objects to [`McpError::JsonRpc`].
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(error) = self.error {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32603);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(McpError::JsonRpc { code, message });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// One initialized MCP session.
///
/// Implementations guarantee that `close` never propagates errors: cleanup
/// failures are logged and suppressed, so release is safe on every exit path.
#[async_trait]
pub trait McpSession: Send {
    /// Invokes a tool by name with the given (already expanded) arguments.
    async fn call_tool(&mut self, tool_name: &str, arguments: Value) -> Result<Value, McpError>;

    /// Releases the session. Safe to call after a prior failure.
    async fn close(&mut self);
}

/// Establishes a session for the configured transport.
///
/// The full connect + initialize handshake runs under
/// `server.connect_timeout()`; exceeding it fails fast with
/// [`McpError::Timeout`] rather than hanging the run.
pub async fn connect(server: &ServerConfig) -> Result<Box<dyn McpSession>, McpError> {
    let handshake = async {
        let session: Box<dyn McpSession> = match server.transport {
            Transport::Stdio => Box::new(stdio::StdioSession::connect(server).await?),
            Transport::Sse => Box::new(sse::SseSession::connect(server).await?),
            Transport::StreamableHttp => {
                Box::new(streamable_http::StreamableHttpSession::connect(server).await?)
            },
        };
        Ok(session)
    };
    tokio::time::timeout(server.connect_timeout(), handshake)
        .await
        .map_err(|_| McpError::Timeout)?
}
