// Historical path: bucketed network / per-node history and the latest snapshot

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::Value;

use super::{ApiError, AppState};
use crate::history;
use crate::models::{HistoryQuery, NetworkSnapshot};
use crate::snapshot_store::SnapshotStore;

#[derive(Debug, Default, Deserialize)]
pub(super) struct HistoryParams {
    period: Option<String>,
    interval: Option<String>,
}

impl HistoryParams {
    fn parse(&self) -> Result<HistoryQuery, ApiError> {
        Ok(HistoryQuery::parse(
            self.period.as_deref(),
            self.interval.as_deref(),
        )?)
    }
}

fn require_store(state: &AppState) -> Result<&Arc<SnapshotStore>, ApiError> {
    state
        .store
        .as_ref()
        .ok_or(ApiError::Disabled("Snapshot store is not configured"))
}

/// GET /api/nodes/history?period=&interval=: `[{time, online, total}]`, oldest first.
pub(super) async fn network_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let query = params.parse()?;
    let store = require_store(&state)?;
    let key = format!("history:{}", query.cache_key());
    let body = state
        .cache
        .get_or_fill(&key, || async {
            let points = history::query(store, &query).await?;
            serde_json::to_value(points).map_err(|e| ApiError::Internal(e.to_string()))
        })
        .await?;
    Ok(Json(body))
}

/// GET /api/nodes/{node_id}/history?period=&interval=
pub(super) async fn node_history(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let query = params.parse()?;
    let store = require_store(&state)?;
    let key = format!("node-history:{}:{}", node_id, query.cache_key());
    let body = state
        .cache
        .get_or_fill(&key, || async {
            let points = history::query_node(store, &node_id, &query).await?;
            serde_json::to_value(points).map_err(|e| ApiError::Internal(e.to_string()))
        })
        .await?;
    Ok(Json(body))
}

/// GET /api/nodes/latest
pub(super) async fn latest_snapshot(
    State(state): State<AppState>,
) -> Result<Json<NetworkSnapshot>, ApiError> {
    let store = require_store(&state)?;
    store
        .latest_snapshot()
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("No snapshot recorded yet"))
}
