//! Legacy HTTP+SSE transport session.
//!
//! The client opens a long-lived GET event stream. The server's first
//! `endpoint` event names the URL to POST JSON-RPC messages to; responses
//! then arrive as `message` events on the stream. POSTs are acknowledged
//! with 202 Accepted and carry no response body.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::client::{JsonRpcRequest, JsonRpcResponse, McpSession};
use crate::config::ServerConfig;
use crate::error::McpError;

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `"message"` when the stream did not name one.
    pub event: String,
    /// Concatenated data lines.
    pub data: String,
}

/// Incremental SSE wire-format parser.
///
/// Feed it raw chunks as they arrive; completed events come back in order.
/// Handles CRLF line endings, multi-line `data:` fields, and `:` comments.
/// Unknown fields (`id:`, `retry:`) are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk of stream text, returning any completed events.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            // Blank line dispatches the accumulated event, if any.
            let data_lines = std::mem::take(&mut self.data_lines);
            let event_name = self.event_name.take();
            if data_lines.is_empty() {
                return None;
            }
            return Some(SseEvent {
                event: event_name.unwrap_or_else(|| "message".to_string()),
                data: data_lines.join("\n"),
            });
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event_name = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data_lines
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }
}

/// One MCP session over the legacy HTTP+SSE transport pair.
pub struct SseSession {
    http: reqwest::Client,
    endpoint: Url,
    events: mpsc::UnboundedReceiver<SseEvent>,
    reader: JoinHandle<()>,
    next_id: u64,
}

impl SseSession {
    /// Opens the event stream, discovers the POST endpoint, and performs the
    /// initialize handshake.
    pub async fn connect(server: &ServerConfig) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .connect_timeout(server.connect_timeout())
            .build()
            .map_err(|e| McpError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let base = Url::parse(&server.endpoint_url()).map_err(|e| McpError::Connection {
            message: format!("invalid SSE URL '{}': {e}", server.endpoint_url()),
        })?;

        let response = http
            .get(base.clone())
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::classify_reqwest(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Http {
                status: status.as_u16(),
                body: format!("SSE stream request to {base} rejected"),
            });
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_event_stream(response, event_tx));

        // The first endpoint event names where to POST messages.
        let endpoint = loop {
            match event_rx.recv().await {
                Some(event) if event.event == "endpoint" => {
                    break base.join(event.data.trim()).map_err(|e| McpError::Protocol {
                        message: format!("invalid endpoint event '{}': {e}", event.data),
                    })?;
                },
                Some(_) => continue,
                None => {
                    reader.abort();
                    return Err(McpError::Connection {
                        message: "event stream closed before the endpoint event".to_string(),
                    });
                },
            }
        };
        debug!(%endpoint, "SSE endpoint discovered");

        let mut session = Self {
            http,
            endpoint,
            events: event_rx,
            reader,
            next_id: 0,
        };

        let id = session.next_id();
        let response = session.request(JsonRpcRequest::initialize(id)).await?;
        response.into_result()?;
        session
            .notify(&JsonRpcRequest::notification("notifications/initialized"))
            .await?;
        debug!("SSE session initialized");
        Ok(session)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// POSTs one message to the discovered endpoint.
    async fn notify(&mut self, message: &JsonRpcRequest) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::classify_reqwest(&e))?;
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

    /// POSTs a request and waits for its response on the event stream.
    async fn request(&mut self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let id = request.id.clone();
        self.notify(&request).await?;
        loop {
            match self.events.recv().await {
                Some(event) if event.event == "message" => {
                    match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                        Ok(frame) if frame.answers(id.as_ref()) => return Ok(frame),
                        // Unrelated frames (notifications, other ids) are skipped.
                        _ => continue,
                    }
                },
                Some(_) => continue,
                None => {
                    return Err(McpError::Connection {
                        message: "event stream closed while awaiting a response".to_string(),
                    })
                },
            }
        }
    }
}

/// Pumps the streaming GET body through the parser into the event channel.
async fn read_event_stream(
    response: reqwest::Response,
    events: mpsc::UnboundedSender<SseEvent>,
) {
    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    while let Some(chunk) = stream.next().await {
        let Ok(bytes) = chunk else {
            return;
        };
        for event in parser.feed(&String::from_utf8_lossy(&bytes)) {
            if events.send(event).is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl McpSession for SseSession {
    async fn call_tool(&mut self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let id = self.next_id();
        let response = self
            .request(JsonRpcRequest::tools_call(id, tool_name, arguments))
            .await?;
        response.into_result()
    }

    async fn close(&mut self) {
        self.reader.abort();
        self.events.close();
    }
}
