// HTTP routes: live proxy (pod credits, node RPC) and history reads

mod error;
mod history;
mod http;
mod proxy;

pub use error::ApiError;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::response_cache::ResponseCache;
use crate::rpc_client::RpcClient;
use crate::snapshot_store::SnapshotStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) rpc_client: RpcClient,
    pub(crate) store: Option<Arc<SnapshotStore>>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) pods_credits_url: Option<String>,
}

pub fn app(
    rpc_client: RpcClient,
    store: Option<Arc<SnapshotStore>>,
    cache: Arc<ResponseCache>,
    config: &AppConfig,
) -> Router {
    let state = AppState {
        rpc_client,
        store,
        cache,
        pods_credits_url: config.pods_credits_url(),
    };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/health", get(http::health_handler)) // GET /health
        .route("/api/pods-credits", get(proxy::pods_credits)) // GET /api/pods-credits
        .route("/api/rpc", post(proxy::rpc)) // POST /api/rpc
        .route("/api/nodes/history", get(history::network_history)) // GET /api/nodes/history
        .route("/api/nodes/latest", get(history::latest_snapshot)) // GET /api/nodes/latest
        .route("/api/nodes/{node_id}/history", get(history::node_history)) // GET /api/nodes/{id}/history
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(state)
}
