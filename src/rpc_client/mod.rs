// Remote node client: timed JSON-RPC calls to pNode endpoints and plain JSON GETs
// against the pod-credit aggregation service. No retries here; callers own retry policy.

mod pnode;

pub use pnode::{NodeStats, PodInfo};

use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

use crate::version::USER_AGENT;

/// Default per-call deadline; a node that misses it is reported offline.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid JSON response from upstream: {body}")]
    InvalidResponse { body: String },
    #[error("Upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("RPC error: {0}")]
    Remote(String),
}

impl RpcError {
    /// Timeouts are abandoned for the rest of a tick; only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport(_))
    }
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// POSTs `{"jsonrpc":"2.0","method":method,"id":1}` to `endpoint` and returns the
    /// unwrapped `result` member (or the whole body when it is not an envelope).
    #[instrument(skip(self), fields(client = "rpc", operation = "call"))]
    pub async fn call(&self, endpoint: &str, method: &str) -> Result<Value, RpcError> {
        let url = endpoint_url(endpoint);
        let envelope = json!({
            "jsonrpc": "2.0",
            "method": method,
            "id": 1,
        });
        let body = self.execute(self.client.post(&url).json(&envelope)).await?;
        unwrap_envelope(body)
    }

    /// GETs `url` and returns its JSON body as-is.
    #[instrument(skip(self), fields(client = "rpc", operation = "fetch_json"))]
    pub async fn fetch_json(&self, url: &str) -> Result<Value, RpcError> {
        self.execute(self.client.get(url)).await
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Value, RpcError> {
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
            Ok::<_, RpcError>((status, text))
        };
        let (status, text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RpcError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if !status.is_success() {
            return Err(RpcError::UpstreamStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Ok(value),
            Err(_) => Err(RpcError::InvalidResponse { body: text }),
        }
    }
}

/// Bare `host:port` endpoints are expanded to the pNode RPC path.
pub fn endpoint_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}/rpc", endpoint.trim_end_matches('/'))
    }
}

fn unwrap_envelope(body: Value) -> Result<Value, RpcError> {
    match body {
        Value::Object(mut map) => {
            if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
                return Err(RpcError::Remote(remote_error_message(error)));
            }
            match map.remove("result") {
                Some(result) => Ok(result),
                None => Ok(Value::Object(map)),
            }
        }
        other => Ok(other),
    }
}

fn remote_error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
