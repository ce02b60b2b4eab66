//! Mock-server integration tests for the HTTP transports.

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use mcp_stress::client;
use mcp_stress::config::{ServerConfig, Transport};
use mcp_stress::error::McpError;

/// Builds a [`ServerConfig`] pointing at the mock server.
fn config_for(server: &ServerGuard, transport: Transport, path: &str) -> ServerConfig {
    let host_with_port = server.host_with_port();
    let (host, port) = host_with_port
        .split_once(':')
        .expect("mockito host is host:port");
    ServerConfig {
        transport,
        host: host.to_string(),
        port: Some(port.parse().expect("mockito port is numeric")),
        path: Some(path.to_string()),
        connect_timeout_ms: 5_000,
        request_timeout_ms: 5_000,
    }
}

fn initialize_result_body(id: u64) -> String {
    json!({
        "jsonrpc": "2.0",
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "serverInfo": {"name": "mock-server", "version": "0.0.1"}
        },
        "id": id
    })
    .to_string()
}

#[tokio::test]
async fn test_streamable_http_handshake_and_tool_call() {
    let mut server = Server::new_async().await;

    let init_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "initialize"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("mcp-session-id", "sess-1")
        .with_body(initialize_result_body(1))
        .create_async()
        .await;
    let initialized_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(
            json!({"method": "notifications/initialized"}),
        ))
        .match_header("mcp-session-id", "sess-1")
        .with_status(202)
        .create_async()
        .await;
    let call_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "tools/call"})))
        .match_header("mcp-session-id", "sess-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "result": {"content": [{"type": "text", "text": "4"}]},
                "id": 2
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = config_for(&server, Transport::StreamableHttp, "/mcp");
    let mut session = client::connect(&config).await.unwrap();
    let result = session
        .call_tool("calculate", json!({"expression": "2+2"}))
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "4");
    session.close().await;

    init_mock.assert_async().await;
    initialized_mock.assert_async().await;
    call_mock.assert_async().await;
}

#[tokio::test]
async fn test_streamable_http_sse_framed_response_body() {
    let mut server = Server::new_async().await;

    let _init_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "initialize"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(initialize_result_body(1))
        .create_async()
        .await;
    let _initialized_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(
            json!({"method": "notifications/initialized"}),
        ))
        .with_status(202)
        .create_async()
        .await;
    let _call_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "tools/call"})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"result\":{\"content\":[]},\"id\":2}\n",
            "\n",
        ))
        .create_async()
        .await;

    let config = config_for(&server, Transport::StreamableHttp, "/mcp");
    let mut session = client::connect(&config).await.unwrap();
    let result = session.call_tool("echo", json!({})).await.unwrap();
    assert_eq!(result["content"], json!([]));
    session.close().await;
}

#[tokio::test]
async fn test_streamable_http_jsonrpc_error_maps_to_invocation_error() {
    let mut server = Server::new_async().await;

    let _init_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "initialize"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(initialize_result_body(1))
        .create_async()
        .await;
    let _initialized_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(
            json!({"method": "notifications/initialized"}),
        ))
        .with_status(202)
        .create_async()
        .await;
    let _call_mock = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "tools/call"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "Method not found"},
                "id": 2
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = config_for(&server, Transport::StreamableHttp, "/mcp");
    let mut session = client::connect(&config).await.unwrap();
    let err = session.call_tool("missing", json!({})).await.unwrap_err();
    match err {
        McpError::JsonRpc { code, message } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "Method not found");
        },
        other => panic!("Expected JsonRpc error, got {other:?}"),
    }
    session.close().await;
}

#[tokio::test]
async fn test_streamable_http_server_error_fails_handshake() {
    let mut server = Server::new_async().await;

    let _init_mock = server
        .mock("POST", "/mcp")
        .with_status(500)
        .with_body("overloaded")
        .create_async()
        .await;

    let config = config_for(&server, Transport::StreamableHttp, "/mcp");
    let err = client::connect(&config).await.err().unwrap();
    match err {
        McpError::Http { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "overloaded");
        },
        other => panic!("Expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sse_session_end_to_end() {
    let mut server = Server::new_async().await;

    // The whole server side of the conversation rides the GET stream: the
    // endpoint event first, then the responses to the POSTed requests.
    let stream_body = concat!(
        "event: endpoint\n",
        "data: /messages\n",
        "\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"result\":{\"protocolVersion\":\"2024-11-05\"},\"id\":1}\n",
        "\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"pong\"}]},\"id\":2}\n",
        "\n",
    );
    let stream_mock = server
        .mock("GET", "/sse")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(stream_body)
        .create_async()
        .await;
    // initialize, notifications/initialized, tools/call -- three POSTs.
    let post_mock = server
        .mock("POST", "/messages")
        .with_status(202)
        .expect(3)
        .create_async()
        .await;

    let config = config_for(&server, Transport::Sse, "/sse");
    let mut session = client::connect(&config).await.unwrap();
    let result = session.call_tool("ping", json!({})).await.unwrap();
    assert_eq!(result["content"][0]["text"], "pong");
    session.close().await;

    stream_mock.assert_async().await;
    post_mock.assert_async().await;
}

#[tokio::test]
async fn test_sse_stream_closing_before_endpoint_is_connection_error() {
    let mut server = Server::new_async().await;

    let _stream_mock = server
        .mock("GET", "/sse")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(": just a comment, no events\n")
        .create_async()
        .await;

    let config = config_for(&server, Transport::Sse, "/sse");
    let err = client::connect(&config).await.err().unwrap();
    assert!(matches!(err, McpError::Connection { .. }));
}

#[tokio::test]
async fn test_connect_to_unreachable_server_is_classified() {
    let config = ServerConfig {
        transport: Transport::StreamableHttp,
        host: "127.0.0.1".to_string(),
        port: Some(1),
        path: Some("/mcp".to_string()),
        connect_timeout_ms: 1_000,
        request_timeout_ms: 1_000,
    };
    let err = client::connect(&config).await.err().unwrap();
    assert!(
        matches!(err, McpError::Connection { .. } | McpError::Timeout),
        "expected connection-class error, got {err:?}"
    );
}
