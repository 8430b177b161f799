// SQLite-backed document collections: network snapshots, per-node history, pod-credit documents.
// Writes are append-only; rows leave only through an explicit operator clear.

mod blob;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;

use crate::models::{HistoryPoint, NetworkSnapshot, NodeHistoryPoint};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("snapshot store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode samples: {0}")]
    Encode(String),
    #[error("decode document: {0}")]
    Decode(String),
}

/// Named collections the operator can bulk-clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Snapshots,
    History,
    Pods,
    All,
}

impl Collection {
    fn tables(self) -> &'static [&'static str] {
        match self {
            Collection::Snapshots => &["snapshots"],
            Collection::History => &["node_history"],
            Collection::Pods => &["pods"],
            Collection::All => &["snapshots", "node_history", "pods"],
        }
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshots" => Ok(Collection::Snapshots),
            "history" => Ok(Collection::History),
            "pods" => Ok(Collection::Pods),
            "all" => Ok(Collection::All),
            other => Err(format!(
                "unknown collection '{}' (expected snapshots, history, pods or all)",
                other
            )),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Collection::Snapshots => "snapshots",
            Collection::History => "history",
            Collection::Pods => "pods",
            Collection::All => "all",
        })
    }
}

/// Write side used by the poller. `SnapshotStore` is the production sink.
pub trait SnapshotSink: Send + Sync {
    /// Appends a snapshot and its per-node rows; returns the stored timestamp.
    fn append_snapshot(
        &self,
        snapshot: &NetworkSnapshot,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn append_pods(
        &self,
        fetched_at: i64,
        document: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn vacuum(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    /// Accepts `sqlite:<path>`, `sqlite://<path>` or a bare file path.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL UNIQUE,
                total_nodes INTEGER NOT NULL,
                online_nodes INTEGER NOT NULL,
                samples BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                node_id TEXT NOT NULL,
                ip TEXT NOT NULL,
                port INTEGER NOT NULL,
                online INTEGER NOT NULL,
                cpu_percent REAL NOT NULL,
                storage_bytes INTEGER NOT NULL,
                uptime_secs INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_node_history_node_ts ON node_history(node_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pods (id INTEGER PRIMARY KEY AUTOINCREMENT, fetched_at INTEGER NOT NULL, body TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Timestamps stay strictly increasing: a snapshot at or before the newest stored one
    /// is written at `newest + 1`.
    #[instrument(skip(self, snapshot), fields(repo = "snapshots", operation = "append_snapshot", total_nodes = snapshot.total_nodes))]
    pub async fn append_snapshot(&self, snapshot: &NetworkSnapshot) -> Result<i64, StoreError> {
        let samples = blob::encode_samples(&snapshot.per_node_samples)?;
        let mut tx = self.pool.begin().await?;

        let newest = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(timestamp) FROM snapshots")
            .fetch_one(&mut *tx)
            .await?;
        let timestamp = match newest {
            Some(newest) if snapshot.timestamp <= newest => newest + 1,
            _ => snapshot.timestamp,
        };

        sqlx::query(
            "INSERT INTO snapshots (timestamp, total_nodes, online_nodes, samples) VALUES ($1, $2, $3, $4)",
        )
        .bind(timestamp)
        .bind(snapshot.total_nodes as i64)
        .bind(snapshot.online_nodes as i64)
        .bind(&samples)
        .execute(&mut *tx)
        .await?;

        for s in &snapshot.per_node_samples {
            sqlx::query(
                "INSERT INTO node_history (timestamp, node_id, ip, port, online, cpu_percent, storage_bytes, uptime_secs) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(timestamp)
            .bind(&s.node_id)
            .bind(&s.ip)
            .bind(s.port as i64)
            .bind(s.online)
            .bind(s.metrics.cpu_percent)
            .bind(s.metrics.storage_bytes as i64)
            .bind(s.metrics.uptime_secs as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(timestamp)
    }

    /// Snapshot counts in `[from_ts, to_ts]`. Order: ascending by timestamp.
    #[instrument(skip(self), fields(repo = "snapshots", operation = "snapshot_counts_in_range"))]
    pub async fn snapshot_counts_in_range(
        &self,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<HistoryPoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT timestamp, online_nodes, total_nodes FROM snapshots
             WHERE timestamp >= $1 AND timestamp <= $2 ORDER BY timestamp ASC",
        )
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let online: i64 = row.try_get("online_nodes")?;
            let total: i64 = row.try_get("total_nodes")?;
            out.push(HistoryPoint {
                time: row.try_get("timestamp")?,
                online: online as u32,
                total: total as u32,
            });
        }
        Ok(out)
    }

    /// One node's rows in `[from_ts, to_ts]`. Order: ascending by timestamp.
    #[instrument(skip(self), fields(repo = "node_history", operation = "node_history_in_range"))]
    pub async fn node_history_in_range(
        &self,
        node_id: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<NodeHistoryPoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT timestamp, online, cpu_percent, storage_bytes, uptime_secs FROM node_history
             WHERE node_id = $1 AND timestamp >= $2 AND timestamp <= $3 ORDER BY timestamp ASC",
        )
        .bind(node_id)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let storage_bytes: i64 = row.try_get("storage_bytes")?;
            let uptime_secs: i64 = row.try_get("uptime_secs")?;
            out.push(NodeHistoryPoint {
                time: row.try_get("timestamp")?,
                online: row.try_get("online")?,
                cpu_percent: row.try_get("cpu_percent")?,
                storage_bytes: storage_bytes as u64,
                uptime_secs: uptime_secs as u64,
            });
        }
        Ok(out)
    }

    pub async fn latest_snapshot(&self) -> Result<Option<NetworkSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT timestamp, total_nodes, online_nodes, samples FROM snapshots ORDER BY timestamp DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_snapshot_row).transpose()
    }

    /// Newest `limit` snapshots, returned oldest first.
    pub async fn recent_snapshots(&self, limit: u32) -> Result<Vec<NetworkSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT timestamp, total_nodes, online_nodes, samples FROM snapshots ORDER BY timestamp DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(parse_snapshot_row(row)?);
        }
        out.reverse();
        Ok(out)
    }

    #[instrument(skip(self, document), fields(repo = "pods", operation = "append_pods"))]
    pub async fn append_pods(&self, fetched_at: i64, document: &Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO pods (fetched_at, body) VALUES ($1, $2)")
            .bind(fetched_at)
            .bind(document.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Newest pod-credit document with its fetch time.
    pub async fn latest_pods(&self) -> Result<Option<(i64, Value)>, StoreError> {
        let row = sqlx::query("SELECT fetched_at, body FROM pods ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let fetched_at: i64 = row.try_get("fetched_at")?;
        let body: String = row.try_get("body")?;
        let document =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some((fetched_at, document)))
    }

    /// Operator bulk clear. Returns the number of rows removed.
    #[instrument(skip(self), fields(repo = "snapshots", operation = "clear"))]
    pub async fn clear(&self, collection: Collection) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for table in collection.tables() {
            let r = sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
            removed += r.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let mut total = 0;
        for table in collection.tables() {
            let n = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Reclaim space after a bulk clear.
    #[instrument(skip(self), fields(repo = "snapshots", operation = "vacuum"))]
    pub async fn vacuum(&self) -> Result<(), StoreError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl SnapshotSink for SnapshotStore {
    async fn append_snapshot(&self, snapshot: &NetworkSnapshot) -> Result<i64, StoreError> {
        SnapshotStore::append_snapshot(self, snapshot).await
    }

    async fn append_pods(&self, fetched_at: i64, document: &Value) -> Result<(), StoreError> {
        SnapshotStore::append_pods(self, fetched_at, document).await
    }

    async fn vacuum(&self) -> Result<(), StoreError> {
        SnapshotStore::vacuum(self).await
    }
}

fn parse_snapshot_row(row: &SqliteRow) -> Result<NetworkSnapshot, StoreError> {
    let timestamp: i64 = row.try_get("timestamp")?;
    let total_nodes: i64 = row.try_get("total_nodes")?;
    let online_nodes: i64 = row.try_get("online_nodes")?;
    let samples: Vec<u8> = row.try_get("samples")?;
    Ok(NetworkSnapshot {
        timestamp,
        total_nodes: total_nodes as u32,
        online_nodes: online_nodes as u32,
        per_node_samples: blob::decode_samples(&samples),
    })
}
