// Background poller: every tick, probe the known node set concurrently, assemble a
// NetworkSnapshot from whatever answered, and append it to the store.
// VACUUM runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, interval};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::history::now_ms;
use crate::models::{NetworkSnapshot, NodeSample, NodeTarget};
use crate::rpc_client::{NodeStats, PodInfo, RpcClient, RpcError};
use crate::snapshot_store::{SnapshotSink, StoreError};

/// Pause between transport-level probe retries.
const PROBE_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Poll timing, node set, and maintenance schedule.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub tick_deadline: Duration,
    pub max_concurrency: usize,
    pub probe_retries: u32,
    pub nodes: Vec<NodeTarget>,
    pub seeds: Vec<String>,
    pub rpc_port: u16,
    pub pods_credits_url: Option<String>,
    pub stats_log_interval: Duration,
    /// Optional cron expression for VACUUM. Uses local time.
    pub vacuum_schedule: Option<String>,
    pub vacuum_interval: Duration,
}

impl PollerConfig {
    pub fn from_app_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            poll_interval: Duration::from_secs(config.polling.interval_secs),
            tick_deadline: Duration::from_secs(config.polling.tick_deadline_secs),
            max_concurrency: config.polling.max_concurrency,
            probe_retries: config.polling.probe_retries,
            nodes: config.node_targets()?,
            seeds: config.polling.seeds.clone(),
            rpc_port: config.polling.rpc_port,
            pods_credits_url: config.pods_credits_url(),
            stats_log_interval: Duration::from_secs(config.polling.stats_log_interval_secs),
            vacuum_schedule: config.maintenance.vacuum_schedule.clone(),
            vacuum_interval: Duration::from_secs(config.maintenance.vacuum_interval_secs),
        })
    }
}

/// Client, sink, counters, and shutdown for the poller.
pub struct PollerDeps<S> {
    pub client: RpcClient,
    pub sink: Arc<S>,
    pub snapshots_saved_total: Arc<AtomicU64>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// A node in this tick's set, with whatever seed gossip said about it.
#[derive(Debug, Clone)]
pub struct KnownNode {
    pub target: NodeTarget,
    pub version: Option<String>,
    pub last_seen_at: Option<i64>,
}

impl KnownNode {
    fn offline_sample(&self) -> NodeSample {
        NodeSample {
            version: self.version.clone(),
            last_seen_at: self.last_seen_at,
            ..NodeSample::offline(&self.target)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub timestamp: i64,
    pub total_nodes: u32,
    pub online_nodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Persisted(TickReport),
    /// The store rejected the write; the snapshot is dropped.
    Skipped,
}

/// Spawns the poller loop. Returns a join handle that completes after shutdown.
pub fn spawn<S: SnapshotSink + 'static>(
    deps: PollerDeps<S>,
    config: PollerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(deps, config).await;
    })
}

#[instrument(skip_all, fields(interval_secs = config.poll_interval.as_secs()))]
async fn run<S: SnapshotSink>(deps: PollerDeps<S>, config: PollerConfig) {
    let PollerDeps {
        client,
        sink,
        snapshots_saved_total,
        mut shutdown_rx,
    } = deps;

    let mut poll_tick = interval(config.poll_interval);
    poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut stats_log_tick = interval(config.stats_log_interval);
    stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let vacuum_task = tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    let mut ticks_skipped_total: u64 = 0;
    let mut last_report: Option<TickReport> = None;

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                match poll_once(&client, sink.as_ref(), &config).await {
                    TickOutcome::Persisted(report) => {
                        snapshots_saved_total.fetch_add(1, Ordering::Relaxed);
                        last_report = Some(report);
                    }
                    TickOutcome::Skipped => ticks_skipped_total += 1,
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = sink.vacuum().await {
                    warn!(error = %e, operation = "vacuum", "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = stats_log_tick.tick() => {
                info!(
                    snapshots_saved_total = snapshots_saved_total.load(Ordering::Relaxed),
                    ticks_skipped_total,
                    last_total_nodes = last_report.map(|r| r.total_nodes),
                    last_online_nodes = last_report.map(|r| r.online_nodes),
                    "poller stats"
                );
            }
            _ = &mut shutdown_rx => {
                debug!("Poller shutting down");
                break;
            }
        }
    }
    vacuum_task.abort();
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: PollerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            if let Some(next) = schedule.after(&now).next() {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        loop {
            tokio::time::sleep(config.vacuum_interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// One tick with failures contained: a store error is logged and the tick skipped.
pub async fn poll_once<S: SnapshotSink>(
    client: &RpcClient,
    sink: &S,
    config: &PollerConfig,
) -> TickOutcome {
    match run_one_tick(client, sink, config).await {
        Ok(report) => {
            debug!(
                timestamp = report.timestamp,
                total_nodes = report.total_nodes,
                online_nodes = report.online_nodes,
                "snapshot saved"
            );
            TickOutcome::Persisted(report)
        }
        Err(e) => {
            warn!(error = %e, operation = "append_snapshot", "polling tick skipped");
            TickOutcome::Skipped
        }
    }
}

/// Discovers nodes, probes them, and appends the snapshot. Only store failures are errors;
/// node failures become offline samples.
pub async fn run_one_tick<S: SnapshotSink>(
    client: &RpcClient,
    sink: &S,
    config: &PollerConfig,
) -> Result<TickReport, StoreError> {
    let deadline = Instant::now() + config.tick_deadline;
    let nodes = resolve_known_nodes(client, config, deadline).await;
    let snapshot = collect_snapshot(client, nodes, config, now_ms(), deadline).await;
    let timestamp = sink.append_snapshot(&snapshot).await?;

    if let Some(url) = &config.pods_credits_url {
        match client.fetch_json(url).await {
            Ok(document) => {
                if let Err(e) = sink.append_pods(timestamp, &document).await {
                    warn!(error = %e, operation = "append_pods", "pod credits not stored");
                }
            }
            Err(e) => warn!(error = %e, operation = "fetch_pods_credits", "pod credits fetch failed"),
        }
    }

    Ok(TickReport {
        timestamp,
        total_nodes: snapshot.total_nodes,
        online_nodes: snapshot.online_nodes,
    })
}

/// Static nodes first, then nodes gossiped by the seeds, deduplicated by address.
/// Seeds are queried concurrently and share the tick deadline; a seed that fails or
/// is still pending at the deadline is logged and skipped.
pub async fn resolve_known_nodes(
    client: &RpcClient,
    config: &PollerConfig,
    deadline: Instant,
) -> Vec<KnownNode> {
    let mut nodes: Vec<KnownNode> = config
        .nodes
        .iter()
        .cloned()
        .map(|target| KnownNode {
            target,
            version: None,
            last_seen_at: None,
        })
        .collect();

    let mut gossip: Vec<Vec<PodInfo>> = vec![Vec::new(); config.seeds.len()];
    let mut queries = JoinSet::new();
    for (idx, seed) in config.seeds.iter().enumerate() {
        let client = client.clone();
        let seed = seed.clone();
        queries.spawn(async move {
            let pods = client.get_pods(&seed).await;
            (idx, seed, pods)
        });
    }
    loop {
        match tokio::time::timeout_at(deadline, queries.join_next()).await {
            Ok(Some(Ok((idx, _, Ok(pods))))) => gossip[idx] = pods,
            Ok(Some(Ok((_, seed, Err(e))))) => {
                warn!(seed = %seed, error = %e, operation = "get_pods", "seed discovery failed");
            }
            Ok(Some(Err(e))) => warn!(error = %e, "seed query task failed"),
            Ok(None) => break,
            Err(_) => {
                warn!(
                    pending = queries.len(),
                    "tick deadline reached during seed discovery"
                );
                queries.abort_all();
                break;
            }
        }
    }

    for pod in gossip.into_iter().flatten() {
        let Some(ip) = pod.ip() else {
            continue;
        };
        let address = format!("{}:{}", ip, config.rpc_port);
        if let Some(existing) = nodes.iter_mut().find(|n| n.target.address() == address) {
            existing.version = existing.version.take().or(pod.version.clone());
            existing.last_seen_at = existing.last_seen_at.max(pod.last_seen_at_ms());
            continue;
        }
        let Some(mut target) = NodeTarget::parse(&address) else {
            continue;
        };
        if let Some(pubkey) = pod.pubkey.as_deref().filter(|k| !k.is_empty()) {
            target = target.with_node_id(pubkey);
        }
        nodes.push(KnownNode {
            target,
            version: pod.version.clone(),
            last_seen_at: pod.last_seen_at_ms(),
        });
    }
    nodes
}

/// Probes every node concurrently (at most `max_concurrency` in flight) and joins until
/// `deadline`. Every node appears in the result; unanswered ones are offline.
pub async fn collect_snapshot(
    client: &RpcClient,
    nodes: Vec<KnownNode>,
    config: &PollerConfig,
    timestamp: i64,
    deadline: Instant,
) -> NetworkSnapshot {
    let mut samples: Vec<NodeSample> = nodes.iter().map(KnownNode::offline_sample).collect();
    let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut probes = JoinSet::new();

    for (idx, node) in nodes.into_iter().enumerate() {
        let client = client.clone();
        let permits = permits.clone();
        let retries = config.probe_retries;
        probes.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            (idx, probe_node(&client, &node, timestamp, retries).await)
        });
    }

    loop {
        match tokio::time::timeout_at(deadline, probes.join_next()).await {
            Ok(Some(Ok((idx, sample)))) => samples[idx] = sample,
            Ok(Some(Err(e))) => warn!(error = %e, "node probe task failed"),
            Ok(None) => break,
            Err(_) => {
                warn!(
                    pending = probes.len(),
                    "tick deadline reached; pending nodes recorded offline"
                );
                probes.abort_all();
                break;
            }
        }
    }

    NetworkSnapshot::assemble(timestamp, samples)
}

async fn probe_node(client: &RpcClient, node: &KnownNode, seen_at: i64, retries: u32) -> NodeSample {
    let endpoint = node.target.rpc_url();
    let (stats, version) = tokio::join!(
        stats_with_retry(client, &endpoint, retries),
        client.get_version(&endpoint)
    );
    match stats {
        Ok(stats) => NodeSample {
            version: version.ok().or_else(|| node.version.clone()),
            ..NodeSample::online(&node.target, seen_at, stats.into())
        },
        Err(e) => {
            debug!(node = %node.target.address(), error = %e, "node probe failed; recording offline");
            node.offline_sample()
        }
    }
}

async fn stats_with_retry(
    client: &RpcClient,
    endpoint: &str,
    retries: u32,
) -> Result<NodeStats, RpcError> {
    let mut attempt = 0;
    loop {
        match client.get_stats(endpoint).await {
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                tokio::time::sleep(PROBE_RETRY_BACKOFF).await;
            }
            other => return other,
        }
    }
}
