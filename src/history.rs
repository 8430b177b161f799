// Range queries for history charts: persisted rows grouped into fixed-width buckets,
// keeping the most recent row in each bucket. Empty buckets are left out (gaps).

use std::collections::BTreeMap;

use crate::models::{HistoryPoint, HistoryQuery, NodeHistoryPoint};
use crate::snapshot_store::{SnapshotStore, StoreError};

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Network online/total per bucket over the query's window ending now.
pub async fn query(
    store: &SnapshotStore,
    query: &HistoryQuery,
) -> Result<Vec<HistoryPoint>, StoreError> {
    query_at(store, query, now_ms()).await
}

pub async fn query_at(
    store: &SnapshotStore,
    query: &HistoryQuery,
    now_ms: i64,
) -> Result<Vec<HistoryPoint>, StoreError> {
    let (from, to) = query.window(now_ms);
    let rows = store.snapshot_counts_in_range(from, to).await?;
    let interval_ms = query.interval.as_millis();
    Ok(latest_per_bucket(rows, interval_ms, |p| p.time)
        .into_iter()
        .map(|(bucket, p)| HistoryPoint { time: bucket, ..p })
        .collect())
}

/// Same bucketing over one node's samples.
pub async fn query_node(
    store: &SnapshotStore,
    node_id: &str,
    query: &HistoryQuery,
) -> Result<Vec<NodeHistoryPoint>, StoreError> {
    query_node_at(store, node_id, query, now_ms()).await
}

pub async fn query_node_at(
    store: &SnapshotStore,
    node_id: &str,
    query: &HistoryQuery,
    now_ms: i64,
) -> Result<Vec<NodeHistoryPoint>, StoreError> {
    let (from, to) = query.window(now_ms);
    let rows = store.node_history_in_range(node_id, from, to).await?;
    let interval_ms = query.interval.as_millis();
    Ok(latest_per_bucket(rows, interval_ms, |p| p.time)
        .into_iter()
        .map(|(bucket, p)| NodeHistoryPoint { time: bucket, ..p })
        .collect())
}

/// Groups items into `interval_ms` buckets keyed by bucket start; within a bucket the item
/// with the greatest timestamp wins (ties go to the later item). Output is ascending.
pub fn latest_per_bucket<T>(
    items: Vec<T>,
    interval_ms: i64,
    timestamp: impl Fn(&T) -> i64,
) -> Vec<(i64, T)> {
    debug_assert!(interval_ms > 0, "bucket width must be positive");
    let mut by_bucket: BTreeMap<i64, (i64, T)> = BTreeMap::new();
    for item in items {
        let ts = timestamp(&item);
        let bucket = ts.div_euclid(interval_ms) * interval_ms;
        let replace = by_bucket
            .get(&bucket)
            .is_none_or(|(kept_ts, _)| *kept_ts <= ts);
        if replace {
            by_bucket.insert(bucket, (ts, item));
        }
    }
    by_bucket
        .into_iter()
        .map(|(bucket, (_, item))| (bucket, item))
        .collect()
}
