// Shared test helpers
#![allow(dead_code)]

use pnode_monitor::models::*;
use pnode_monitor::snapshot_store::SnapshotStore;
use tempfile::TempDir;

pub fn target(address: &str) -> NodeTarget {
    NodeTarget::parse(address).unwrap()
}

pub fn online_sample(address: &str, seen_at: i64, cpu_percent: f64) -> NodeSample {
    NodeSample::online(
        &target(address),
        seen_at,
        NodeMetrics {
            cpu_percent,
            storage_bytes: 1_000,
            uptime_secs: 60,
            ram_used: 0,
            ram_total: 0,
        },
    )
}

pub fn offline_sample(address: &str) -> NodeSample {
    NodeSample::offline(&target(address))
}

/// Snapshot with `online` reachable nodes out of `total`.
pub fn snapshot(timestamp: i64, online: usize, total: usize) -> NetworkSnapshot {
    let samples = (0..total)
        .map(|i| {
            let address = format!("10.0.0.{}:6000", i + 1);
            if i < online {
                online_sample(&address, timestamp, 5.0)
            } else {
                offline_sample(&address)
            }
        })
        .collect();
    NetworkSnapshot::assemble(timestamp, samples)
}

/// Fresh store in a temp dir; keep the TempDir alive for the test's duration.
pub async fn temp_store() -> (TempDir, SnapshotStore) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshots.db");
    let store = SnapshotStore::connect(path.to_str().unwrap()).await.unwrap();
    store.init().await.unwrap();
    (dir, store)
}

pub const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[upstream]
rpc_timeout_ms = 2000
cache_ttl_secs = 60

[polling]
interval_secs = 30
tick_deadline_secs = 10
stats_log_interval_secs = 300
nodes = ["10.0.0.1:6000", "10.0.0.2:6000"]
"#;
