// RpcClient tests against a local mock node: envelopes, typed methods, failure mapping

use httpmock::{Method::GET, Method::POST, MockServer};
use pnode_monitor::rpc_client::{RpcClient, RpcError};
use serde_json::json;
use std::time::Duration;

fn client() -> RpcClient {
    RpcClient::new(Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn call_sends_json_rpc_envelope_and_unwraps_result() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rpc")
                .json_body(json!({"jsonrpc": "2.0", "method": "get-version", "id": 1}));
            then.status(200)
                .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": {"version": "0.7.3"}}));
        })
        .await;

    let result = client().call(&server.url("/rpc"), "get-version").await.unwrap();
    assert_eq!(result, json!({"version": "0.7.3"}));
    mock.assert_async().await;
}

#[tokio::test]
async fn call_expands_bare_address_to_rpc_path() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc");
            then.status(200).json_body(json!({"result": 1}));
        })
        .await;

    let endpoint = server.address().to_string();
    assert_eq!(client().call(&endpoint, "get-stats").await.unwrap(), json!(1));
    mock.assert_async().await;
}

#[tokio::test]
async fn typed_methods_decode_results() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc").body_contains("get-stats");
            then.status(200).json_body(json!({"result": {
                "cpu_percent": 3.5, "uptime": 120, "file_size": 4096, "ram_used": 1, "ram_total": 2
            }}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc").body_contains("get-pods");
            then.status(200).json_body(json!({"result": {"pods": [
                {"address": "10.9.0.1:9001", "version": "0.7.0", "last_seen_timestamp": 1700000000, "pubkey": "abc"},
                {"address": "10.9.0.2:9001"}
            ], "total_count": 2}}));
        })
        .await;

    let c = client();
    let url = server.url("/rpc");
    let stats = c.get_stats(&url).await.unwrap();
    assert_eq!(stats.cpu_percent, 3.5);
    assert_eq!(stats.file_size, 4096);

    let pods = c.get_pods(&url).await.unwrap();
    assert_eq!(pods.len(), 2);
    assert_eq!(pods[0].ip(), Some("10.9.0.1"));
    assert_eq!(pods[0].last_seen_at_ms(), Some(1_700_000_000_000));
    assert_eq!(pods[1].version, None);
}

#[tokio::test]
async fn remote_error_member_maps_to_remote() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc");
            then.status(200).json_body(
                json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}}),
            );
        })
        .await;

    let err = client().call(&server.url("/rpc"), "nope").await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == "Method not found"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn non_json_body_keeps_raw_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/pods-credits");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let err = client()
        .fetch_json(&server.url("/api/pods-credits"))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidResponse { ref body } if body == "<html>maintenance</html>"));
    assert!(err.to_string().contains("<html>maintenance</html>"));
}

#[tokio::test]
async fn long_non_json_body_is_carried_whole() {
    let page = format!("<html><body>{}</body></html>", "proxy error ".repeat(300));
    assert!(page.len() > 3_000);
    let server = MockServer::start_async().await;
    let reply = page.clone();
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/rpc");
            then.status(200).body(reply);
        })
        .await;

    let err = client().call(&server.url("/rpc"), "get-stats").await.unwrap_err();
    match err {
        RpcError::InvalidResponse { body } => assert_eq!(body, page),
        other => panic!("expected InvalidResponse, got {:?}", other),
    }
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/pods-credits");
            then.status(502).body("bad gateway");
        })
        .await;

    let err = client()
        .fetch_json(&server.url("/api/pods-credits"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, RpcError::UpstreamStatus { status: 502, ref body } if body == "bad gateway")
    );
}

#[tokio::test]
async fn slow_node_times_out_and_is_not_retryable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc");
            then.status(200)
                .delay(Duration::from_millis(1500))
                .json_body(json!({"result": {}}));
        })
        .await;

    let c = RpcClient::new(Duration::from_millis(200)).unwrap();
    let err = c.call(&server.url("/rpc"), "get-stats").await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout { timeout_ms: 200 }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unreachable_node_is_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = client()
        .call(&format!("127.0.0.1:{}", port), "get-stats")
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));
    assert!(err.is_retryable());
}
