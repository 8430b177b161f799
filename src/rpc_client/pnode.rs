// Typed wrappers for the pNode RPC methods the poller uses: get-stats, get-version, get-pods

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{RpcClient, RpcError};
use crate::models::NodeMetrics;

/// `get-stats` result. Unknown fields are ignored; missing ones read as zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeStats {
    pub cpu_percent: f64,
    pub ram_used: u64,
    pub ram_total: u64,
    pub uptime: u64,
    pub file_size: u64,
}

impl From<NodeStats> for NodeMetrics {
    fn from(stats: NodeStats) -> Self {
        NodeMetrics {
            cpu_percent: stats.cpu_percent,
            storage_bytes: stats.file_size,
            uptime_secs: stats.uptime,
            ram_used: stats.ram_used,
            ram_total: stats.ram_total,
        }
    }
}

/// One entry of a seed node's `get-pods` gossip view.
#[derive(Debug, Clone, Deserialize)]
pub struct PodInfo {
    /// Gossip address (`ip:port`); the RPC port differs and comes from config.
    pub address: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Epoch seconds.
    #[serde(default)]
    pub last_seen_timestamp: Option<i64>,
    #[serde(default)]
    pub pubkey: Option<String>,
}

impl PodInfo {
    pub fn ip(&self) -> Option<&str> {
        let ip = match self.address.rsplit_once(':') {
            Some((ip, _)) => ip,
            None => self.address.as_str(),
        };
        (!ip.is_empty()).then_some(ip)
    }

    pub fn last_seen_at_ms(&self) -> Option<i64> {
        self.last_seen_timestamp.map(|s| s.saturating_mul(1000))
    }
}

#[derive(Deserialize)]
struct PodsResult {
    #[serde(default)]
    pods: Vec<PodInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionResult {
    version: String,
}

impl RpcClient {
    pub async fn get_stats(&self, endpoint: &str) -> Result<NodeStats, RpcError> {
        let value = self.call(endpoint, "get-stats").await?;
        decode(value)
    }

    pub async fn get_version(&self, endpoint: &str) -> Result<String, RpcError> {
        let value = self.call(endpoint, "get-version").await?;
        decode::<VersionResult>(value).map(|v| v.version)
    }

    pub async fn get_pods(&self, endpoint: &str) -> Result<Vec<PodInfo>, RpcError> {
        let value = self.call(endpoint, "get-pods").await?;
        decode::<PodsResult>(value).map(|r| r.pods)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, RpcError> {
    T::deserialize(&value).map_err(|_| RpcError::InvalidResponse {
        body: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_map_to_metrics() {
        let stats: NodeStats = decode(json!({
            "cpu_percent": 12.5,
            "ram_used": 100,
            "ram_total": 400,
            "uptime": 3600,
            "file_size": 5_000_000,
            "packets_sent": 9
        }))
        .unwrap();
        let metrics = NodeMetrics::from(stats);
        assert_eq!(metrics.cpu_percent, 12.5);
        assert_eq!(metrics.storage_bytes, 5_000_000);
        assert_eq!(metrics.uptime_secs, 3600);
        assert_eq!(metrics.ram_total, 400);
    }

    #[test]
    fn pod_ip_strips_gossip_port() {
        let pod: PodInfo = decode(json!({"address": "10.1.2.3:9001"})).unwrap();
        assert_eq!(pod.ip(), Some("10.1.2.3"));
        assert_eq!(pod.last_seen_at_ms(), None);
    }

    #[test]
    fn version_decode_failure_keeps_body() {
        let err = decode::<VersionResult>(json!({"ver": 1})).unwrap_err();
        assert!(matches!(err, RpcError::InvalidResponse { ref body } if body.contains("ver")));
    }
}
