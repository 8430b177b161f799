// Live path: pod-credit pass-through (cached) and single node RPC relay (not cached)

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, AppState};

const PODS_CREDITS_CACHE_KEY: &str = "pods-credits";
const MISSING_RPC_FIELDS: &str = "Missing endpoint or method";

#[derive(Debug, Deserialize)]
pub(super) struct RpcProxyRequest {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    method: Option<String>,
}

/// GET /api/pods-credits
pub(super) async fn pods_credits(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let Some(url) = state.pods_credits_url.as_deref() else {
        return Err(ApiError::Disabled("Pod credits proxy is not configured"));
    };
    let body = state
        .cache
        .get_or_fill(PODS_CREDITS_CACHE_KEY, || state.rpc_client.fetch_json(url))
        .await?;
    Ok(Json(body))
}

/// POST /api/rpc: body `{endpoint, method}`; responds `{result}`.
pub(super) async fn rpc(
    State(state): State<AppState>,
    payload: Result<Json<RpcProxyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError::Input(format!("Invalid request body: {}", e.body_text())))?;
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(endpoint), Some(method)) = (non_empty(request.endpoint), non_empty(request.method))
    else {
        return Err(ApiError::Input(MISSING_RPC_FIELDS.to_string()));
    };
    let result = state.rpc_client.call(&endpoint, &method).await?;
    Ok(Json(json!({ "result": result })))
}
