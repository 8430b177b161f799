use anyhow::Result;
use pnode_monitor::*;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let rpc_client = rpc_client::RpcClient::new(Duration::from_millis(
        app_config.upstream.rpc_timeout_ms,
    ))?;
    let cache = Arc::new(response_cache::ResponseCache::new(Duration::from_secs(
        app_config.upstream.cache_ttl_secs,
    )));

    if app_config.upstream.base_url.is_none() {
        tracing::warn!(
            "{} not set; pod credits proxy disabled",
            config::PROXY_BASE_URL_ENV
        );
    }

    let store = match app_config.store.url.as_deref() {
        Some(url) => {
            let store = snapshot_store::SnapshotStore::connect(url).await?;
            store.init().await?;
            Some(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "{} not set; aggregation service not started, history routes disabled",
                config::STORE_URL_ENV
            );
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let poller_handle = match store.clone() {
        Some(sink) => {
            let poller_config = poller::PollerConfig::from_app_config(&app_config)?;
            tracing::info!(
                static_nodes = poller_config.nodes.len(),
                seeds = poller_config.seeds.len(),
                interval_secs = poller_config.poll_interval.as_secs(),
                "starting poller"
            );
            Some(poller::spawn(
                poller::PollerDeps {
                    client: rpc_client.clone(),
                    sink,
                    snapshots_saved_total: Arc::new(AtomicU64::new(0)),
                    shutdown_rx,
                },
                poller_config,
            ))
        }
        None => None,
    };

    let purge_cache = cache.clone();
    let purge_handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(purge_cache.ttl());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let purged = purge_cache.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "expired cache entries dropped");
            }
        }
    });

    let app = routes::app(rpc_client, store, cache, &app_config);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            if let Some(handle) = poller_handle {
                let _ = handle.await;
            }
        }
    }
    purge_handle.abort();

    Ok(())
}
