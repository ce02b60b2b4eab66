//! Streamable HTTP transport session.
//!
//! Each JSON-RPC message is POSTed to the endpoint URL. Responses come back
//! either as plain JSON or as an SSE-framed body (`data:` lines), depending
//! on the server; both are handled. The `mcp-session-id` response header from
//! the initialize exchange is echoed on every subsequent request, and the
//! session is terminated with a best-effort DELETE on close.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::client::{JsonRpcRequest, JsonRpcResponse, McpSession};
use crate::config::ServerConfig;
use crate::error::McpError;

/// Session header defined by the streamable HTTP transport spec.
const MCP_SESSION_ID: &str = "mcp-session-id";

/// One logical MCP session multiplexed over per-request POSTs.
pub struct StreamableHttpSession {
    http: reqwest::Client,
    url: String,
    session_id: Option<String>,
    next_id: u64,
}

impl StreamableHttpSession {
    /// Connects to the endpoint and performs the initialize handshake.
    pub async fn connect(server: &ServerConfig) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .connect_timeout(server.connect_timeout())
            .build()
            .map_err(|e| McpError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let mut session = Self {
            http,
            url: server.endpoint_url(),
            session_id: None,
            next_id: 0,
        };

        let id = session.next_id();
        let response = session.request(JsonRpcRequest::initialize(id)).await?;
        response.into_result()?;
        session
            .notify(&JsonRpcRequest::notification("notifications/initialized"))
            .await?;
        debug!(url = %session.url, session_id = ?session.session_id, "streamable HTTP session initialized");
        Ok(session)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// POSTs one JSON-RPC message with the transport's standard headers.
    async fn post(&self, message: &JsonRpcRequest) -> Result<reqwest::Response, McpError> {
        let mut builder = self
            .http
            .post(&self.url)
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream")
            .json(message);
        if let Some(session_id) = &self.session_id {
            builder = builder.header(MCP_SESSION_ID, session_id);
        }
        builder
            .send()
            .await
            .map_err(|e| McpError::classify_reqwest(&e))
    }

    /// Sends a request and parses the matching response from the body.
    async fn request(&mut self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let id = request.id.clone();
        let response = self.post(&request).await?;

        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let is_event_stream = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| McpError::classify_reqwest(&e))?;

        if is_event_stream {
            parse_sse_body(&body, id.as_ref())
        } else {
            serde_json::from_str(&body).map_err(|e| McpError::Protocol {
                message: format!("unparseable JSON-RPC response: {e}"),
            })
        }
    }

    /// Sends a notification; 202 Accepted (or any 2xx) acknowledges it.
    async fn notify(&mut self, message: &JsonRpcRequest) -> Result<(), McpError> {
        let response = self.post(message).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Scans an SSE-framed response body for the frame answering `id`.
fn parse_sse_body(body: &str, id: Option<&Value>) -> Result<JsonRpcResponse, McpError> {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        if let Ok(frame) = serde_json::from_str::<JsonRpcResponse>(data.trim_start()) {
            if frame.answers(id) {
                return Ok(frame);
            }
        }
    }
    Err(McpError::Protocol {
        message: "event-stream body held no matching response".to_string(),
    })
}

#[async_trait]
impl McpSession for StreamableHttpSession {
    async fn call_tool(&mut self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let id = self.next_id();
        let response = self
            .request(JsonRpcRequest::tools_call(id, tool_name, arguments))
            .await?;
        response.into_result()
    }

    async fn close(&mut self) {
        // Best-effort session termination; servers may answer 405, which the
        // transport spec allows.
        if let Some(session_id) = self.session_id.take() {
            let result = self
                .http
                .delete(&self.url)
                .header(MCP_SESSION_ID, &session_id)
                .send()
                .await;
            if let Err(e) = result {
                debug!(error = %e, "session DELETE failed");
            }
        }
    }
}
