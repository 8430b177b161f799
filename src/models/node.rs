// pNode models: where to reach a node, and what one polling cycle saw

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

/// A pNode RPC endpoint the poller knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTarget {
    pub node_id: String,
    pub ip: String,
    pub port: u16,
}

impl NodeTarget {
    /// Parses `ip:port`. The node id defaults to the address itself.
    pub fn parse(address: &str) -> Option<Self> {
        let (ip, port) = address.trim().rsplit_once(':')?;
        if ip.is_empty() {
            return None;
        }
        let port = port.parse::<u16>().ok().filter(|p| *p > 0)?;
        Some(Self {
            node_id: format!("{}:{}", ip, port),
            ip: ip.to_string(),
            port,
        })
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}/rpc", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub cpu_percent: f64,
    pub storage_bytes: u64,
    pub uptime_secs: u64,
    #[serde(default)]
    pub ram_used: u64,
    #[serde(default)]
    pub ram_total: u64,
}

/// One node as observed during one polling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct NodeSample {
    pub node_id: String,
    pub ip: String,
    pub port: u16,
    pub online: bool,
    pub version: Option<String>,
    /// Epoch millis of the last successful contact, when known.
    pub last_seen_at: Option<i64>,
    pub metrics: NodeMetrics,
}

impl NodeSample {
    /// Sample for a node that did not answer this tick. Metrics are zeroed.
    pub fn offline(target: &NodeTarget) -> Self {
        Self {
            node_id: target.node_id.clone(),
            ip: target.ip.clone(),
            port: target.port,
            online: false,
            version: None,
            last_seen_at: None,
            metrics: NodeMetrics::default(),
        }
    }

    pub fn online(target: &NodeTarget, seen_at: i64, metrics: NodeMetrics) -> Self {
        Self {
            node_id: target.node_id.clone(),
            ip: target.ip.clone(),
            port: target.port,
            online: true,
            version: None,
            last_seen_at: Some(seen_at),
            metrics,
        }
    }
}
