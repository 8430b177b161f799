// Integration tests: HTTP routes over a mock upstream and a temp store

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::{TEST_CONFIG, snapshot, temp_store};
use httpmock::{Method::GET, Method::POST, MockServer};
use pnode_monitor::config::AppConfig;
use pnode_monitor::history::now_ms;
use pnode_monitor::response_cache::ResponseCache;
use pnode_monitor::routes;
use pnode_monitor::rpc_client::RpcClient;
use pnode_monitor::snapshot_store::SnapshotStore;
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

fn test_server(store: Option<Arc<SnapshotStore>>, base_url: Option<String>) -> TestServer {
    let mut config = AppConfig::load_from_str(TEST_CONFIG).unwrap();
    config.upstream.base_url = base_url;
    let app = routes::app(
        RpcClient::new(Duration::from_secs(2)).unwrap(),
        store,
        Arc::new(ResponseCache::new(Duration::from_secs(60))),
        &config,
    );
    TestServer::new(app)
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = test_server(None, None);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("pnode-monitor")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_health_reports_configured_components() {
    let server = test_server(None, Some("http://127.0.0.1:1".into()));
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({"status": "ok", "store": false, "upstream": true}));
}

#[tokio::test]
async fn test_rpc_missing_method_is_bad_request() {
    let server = test_server(None, None);
    let response = server
        .post("/api/rpc")
        .json(&json!({"endpoint": "10.0.0.1:6000"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"error": "Missing endpoint or method"}));
}

#[tokio::test]
async fn test_rpc_blank_endpoint_is_bad_request() {
    let server = test_server(None, None);
    let response = server
        .post("/api/rpc")
        .json(&json!({"endpoint": "  ", "method": "get-stats"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"error": "Missing endpoint or method"}));
}

#[tokio::test]
async fn test_rpc_relays_result() {
    let node = MockServer::start_async().await;
    let mock = node
        .mock_async(|when, then| {
            when.method(POST).path("/rpc").body_contains("get-version");
            then.status(200)
                .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": {"version": "0.7.2"}}));
        })
        .await;

    let server = test_server(None, None);
    let body = json!({"endpoint": node.address().to_string(), "method": "get-version"});
    let first = server.post("/api/rpc").json(&body).await;
    first.assert_status_ok();
    first.assert_json(&json!({"result": {"version": "0.7.2"}}));

    // Not cached: every call reaches the node.
    server.post("/api/rpc").json(&body).await.assert_status_ok();
    assert_eq!(mock.hits_async().await, 2);
}

#[tokio::test]
async fn test_rpc_non_json_upstream_is_server_error_with_raw_text() {
    let node = MockServer::start_async().await;
    node.mock_async(|when, then| {
        when.method(POST).path("/rpc");
        then.status(200).body("node restarting");
    })
    .await;

    let server = test_server(None, None);
    let response = server
        .post("/api/rpc")
        .json(&json!({"endpoint": node.url("/rpc"), "method": "get-stats"}))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json();
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("node restarting"));
}

#[tokio::test]
async fn test_rpc_long_non_json_upstream_text_is_not_cut() {
    let page = format!("<html>{}</html>", "gateway timeout ".repeat(200));
    assert!(page.len() > 2_048);
    let node = MockServer::start_async().await;
    let reply = page.clone();
    node.mock_async(move |when, then| {
        when.method(POST).path("/rpc");
        then.status(200).body(reply);
    })
    .await;

    let server = test_server(None, None);
    let response = server
        .post("/api/rpc")
        .json(&json!({"endpoint": node.url("/rpc"), "method": "get-stats"}))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains(&page));
}

#[tokio::test]
async fn test_pods_credits_disabled_without_upstream() {
    let server = test_server(None, None);
    let response = server.get("/api/pods-credits").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_pods_credits_passes_through_and_caches() {
    let upstream = MockServer::start_async().await;
    let document = json!({"pods_credits": [{"pod_id": "abc", "credits": 12}], "success": true});
    let doc = document.clone();
    let mock = upstream
        .mock_async(move |when, then| {
            when.method(GET).path("/api/pods-credits");
            then.status(200).json_body(doc);
        })
        .await;

    let server = test_server(None, Some(upstream.base_url()));
    let first = server.get("/api/pods-credits").await;
    first.assert_status_ok();
    first.assert_json(&document);
    let second = server.get("/api/pods-credits").await;
    second.assert_json(&document);
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_pods_credits_concurrent_misses_hit_upstream_once() {
    let upstream = MockServer::start_async().await;
    let mock = upstream
        .mock_async(|when, then| {
            when.method(GET).path("/api/pods-credits");
            then.status(200)
                .delay(Duration::from_millis(300))
                .json_body(json!({"pods_credits": []}));
        })
        .await;

    let server = test_server(None, Some(upstream.base_url()));
    let (a, b, c) = tokio::join!(
        server.get("/api/pods-credits").into_future(),
        server.get("/api/pods-credits").into_future(),
        server.get("/api/pods-credits").into_future(),
    );
    for response in [a, b, c] {
        response.assert_status_ok();
    }
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_pods_credits_upstream_status_is_forwarded() {
    let upstream = MockServer::start_async().await;
    upstream
        .mock_async(|when, then| {
            when.method(GET).path("/api/pods-credits");
            then.status(503).body("busy");
        })
        .await;

    let server = test_server(None, Some(upstream.base_url()));
    let response = server.get("/api/pods-credits").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_history_routes_disabled_without_store() {
    let server = test_server(None, None);
    server
        .get("/api/nodes/history")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    server
        .get("/api/nodes/10.0.0.1:6000/history")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    server
        .get("/api/nodes/latest")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_history_rejects_invalid_period_and_interval() {
    let (_dir, store) = temp_store().await;
    let server = test_server(Some(Arc::new(store)), None);
    server
        .get("/api/nodes/history")
        .add_query_param("period", "2h")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/nodes/history")
        .add_query_param("period", "1h")
        .add_query_param("interval", "1d")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_returns_bucketed_points() {
    let (_dir, store) = temp_store().await;
    let now = now_ms();
    store
        .append_snapshot(&snapshot(now - 20 * 60_000, 2, 3))
        .await
        .unwrap();
    store
        .append_snapshot(&snapshot(now - 5 * 60_000, 3, 3))
        .await
        .unwrap();
    let server = test_server(Some(Arc::new(store)), None);

    let response = server
        .get("/api/nodes/history")
        .add_query_param("period", "1h")
        .add_query_param("interval", "5m")
        .await;
    response.assert_status_ok();
    let points: Vec<Value> = response.json();
    assert_eq!(points.len(), 2);
    assert!(points[0]["time"].as_i64().unwrap() < points[1]["time"].as_i64().unwrap());
    assert_eq!(points[1]["online"], json!(3));
    assert_eq!(points[1]["total"], json!(3));
}

#[tokio::test]
async fn test_node_history_and_latest_snapshot() {
    let (_dir, store) = temp_store().await;
    let store = Arc::new(store);
    let server = test_server(Some(store.clone()), None);

    server
        .get("/api/nodes/latest")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let now = now_ms();
    store
        .append_snapshot(&snapshot(now - 60_000, 1, 2))
        .await
        .unwrap();

    let latest = server.get("/api/nodes/latest").await;
    latest.assert_status_ok();
    let json: Value = latest.json();
    assert_eq!(json["totalNodes"], json!(2));
    assert_eq!(json["onlineNodes"], json!(1));
    assert_eq!(json["perNodeSamples"].as_array().unwrap().len(), 2);

    let history = server.get("/api/nodes/10.0.0.1:6000/history").await;
    history.assert_status_ok();
    let points: Vec<Value> = history.json();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["online"], json!(true));
    assert_eq!(points[0]["cpuPercent"], json!(5.0));
}
