//! stdio transport session.
//!
//! Spawns the MCP server as a child process and speaks newline-delimited
//! JSON-RPC over its stdin/stdout, per the MCP specification. The command
//! line comes from `server.host`, whitespace-split into program and
//! arguments.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::client::{JsonRpcRequest, JsonRpcResponse, McpSession};
use crate::config::ServerConfig;
use crate::error::McpError;

/// Bound on reaping the child after stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// One child process speaking newline-delimited JSON-RPC.
pub struct StdioSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl StdioSession {
    /// Spawns the configured command and performs the initialize handshake.
    pub async fn connect(server: &ServerConfig) -> Result<Self, McpError> {
        let mut parts = server.host.split_whitespace();
        let program = parts.next().ok_or_else(|| McpError::Connection {
            message: "stdio transport requires a command in server.host".to_string(),
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Connection {
                message: format!("failed to spawn '{}': {e}", server.host),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Connection {
            message: "child process has no stdin pipe".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Connection {
            message: "child process has no stdout pipe".to_string(),
        })?;

        let mut session = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            next_id: 0,
        };

        let id = session.next_id();
        let response = session.request(JsonRpcRequest::initialize(id)).await?;
        response.into_result()?;
        session
            .send(&JsonRpcRequest::notification("notifications/initialized"))
            .await?;
        debug!(command = %server.host, "stdio session initialized");
        Ok(session)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Writes one newline-delimited JSON-RPC message to the child's stdin.
    async fn send(&mut self, message: &JsonRpcRequest) -> Result<(), McpError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| McpError::Connection {
            message: "session is closed".to_string(),
        })?;
        let mut frame = serde_json::to_vec(message).map_err(|e| McpError::Protocol {
            message: format!("failed to serialize request: {e}"),
        })?;
        frame.push(b'\n');
        stdin.write_all(&frame).await.map_err(|e| McpError::Connection {
            message: format!("failed to write to child stdin: {e}"),
        })?;
        stdin.flush().await.map_err(|e| McpError::Connection {
            message: format!("failed to flush child stdin: {e}"),
        })
    }

    /// Sends a request and reads frames until the matching response arrives.
    ///
    /// Server-initiated notifications and requests on the pipe are skipped;
    /// EOF means the server went away.
    async fn request(&mut self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let id = request.id.clone();
        self.send(&request).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| McpError::Connection {
                    message: format!("failed to read from child stdout: {e}"),
                })?;
            if read == 0 {
                return Err(McpError::Connection {
                    message: "server closed its stdout".to_string(),
                });
            }
            let frame = line.trim();
            if frame.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(frame) {
                Ok(response) if response.answers(id.as_ref()) => return Ok(response),
                Ok(_) => continue,
                Err(e) => {
                    return Err(McpError::Protocol {
                        message: format!("unparseable frame from server: {e}"),
                    })
                },
            }
        }
    }
}

#[async_trait]
impl McpSession for StdioSession {
    async fn call_tool(&mut self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let id = self.next_id();
        let response = self
            .request(JsonRpcRequest::tools_call(id, tool_name, arguments))
            .await?;
        response.into_result()
    }

    async fn close(&mut self) {
        // Dropping stdin sends EOF; give the server a moment to exit cleanly,
        // then reap it forcefully.
        self.stdin.take();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "stdio server exited"),
            Ok(Err(e)) => debug!(error = %e, "failed to reap stdio server"),
            Err(_) => {
                let _ = self.child.start_kill();
                debug!("stdio server did not exit in time, killed");
            },
        }
    }
}
