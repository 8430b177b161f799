// Network-wide snapshot and the chart points derived from it

use serde::{Deserialize, Serialize};

use super::NodeSample;

/// Point-in-time aggregate of every known node. Counts are derived from the samples,
/// so `online_nodes <= total_nodes` holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub timestamp: i64,
    pub total_nodes: u32,
    pub online_nodes: u32,
    pub per_node_samples: Vec<NodeSample>,
}

impl NetworkSnapshot {
    pub fn assemble(timestamp: i64, per_node_samples: Vec<NodeSample>) -> Self {
        let total_nodes = per_node_samples.len() as u32;
        let online_nodes = per_node_samples.iter().filter(|s| s.online).count() as u32;
        Self {
            timestamp,
            total_nodes,
            online_nodes,
            per_node_samples,
        }
    }

    pub fn offline_nodes(&self) -> u32 {
        self.total_nodes.saturating_sub(self.online_nodes)
    }
}

/// One chart bucket of network history. `time` is the bucket start (epoch millis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: i64,
    pub online: u32,
    pub total: u32,
}

/// One chart bucket of a single node's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHistoryPoint {
    pub time: i64,
    pub online: bool,
    pub cpu_percent: f64,
    pub storage_bytes: u64,
    pub uptime_secs: u64,
}
