use crate::models::NodeTarget;
use crate::response_cache::DEFAULT_CACHE_TTL;
use crate::rpc_client::DEFAULT_RPC_TIMEOUT;
use serde::Deserialize;

/// Environment variable overriding `upstream.base_url`. Unset means pod-credit proxying is off.
pub const PROXY_BASE_URL_ENV: &str = "PROXY_BASE_URL";
/// Environment variable overriding `store.url`. Unset means the poller cannot start.
pub const STORE_URL_ENV: &str = "STORE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    pub polling: PollingConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// `sqlite:<path>` or a bare path.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the pod-credit aggregation API.
    pub base_url: Option<String>,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Freshness window for cached GET responses.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            rpc_timeout_ms: default_rpc_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT.as_millis() as u64
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// Collective deadline for one tick's fan-out; probes still pending are recorded offline.
    pub tick_deadline_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Extra attempts for a node probe that failed at the transport level. Timeouts are not retried.
    #[serde(default = "default_probe_retries")]
    pub probe_retries: u32,
    /// RPC port used for nodes discovered through seed gossip.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    /// Static node set, `ip:port` each.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Endpoints asked for `get-pods` each tick to discover more nodes.
    #[serde(default)]
    pub seeds: Vec<String>,
    /// How often to log poller stats at INFO level.
    pub stats_log_interval_secs: u64,
}

fn default_max_concurrency() -> usize {
    32
}

fn default_probe_retries() -> u32 {
    1
}

fn default_rpc_port() -> u16 {
    6000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            vacuum_schedule: None,
            vacuum_interval_secs: default_vacuum_interval_secs(),
        }
    }
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

impl AppConfig {
    /// Reads `CONFIG_FILE` (default `config.toml`), then applies `PROXY_BASE_URL` / `STORE_URL`.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path, e))?;
        let mut config: AppConfig = toml::from_str(&s)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests). No environment overrides.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Non-empty values from `lookup` replace the file's proxy base URL and store URL.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(PROXY_BASE_URL_ENV) {
            self.upstream.base_url = Some(url);
        }
        if let Some(url) = non_empty(STORE_URL_ENV) {
            self.store.url = Some(url);
        }
    }

    /// `{base}/api/pods-credits`, or None when the upstream is not configured.
    pub fn pods_credits_url(&self) -> Option<String> {
        self.upstream
            .base_url
            .as_deref()
            .map(|base| format!("{}/api/pods-credits", base.trim_end_matches('/')))
    }

    /// Static node set, deduplicated by address, in file order.
    pub fn node_targets(&self) -> anyhow::Result<Vec<NodeTarget>> {
        let mut out: Vec<NodeTarget> = Vec::with_capacity(self.polling.nodes.len());
        for raw in &self.polling.nodes {
            let target = NodeTarget::parse(raw)
                .ok_or_else(|| anyhow::anyhow!("polling.nodes: invalid address '{}'", raw))?;
            if !out.iter().any(|t| t.address() == target.address()) {
                out.push(target);
            }
        }
        Ok(out)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        if let Some(url) = &self.store.url {
            anyhow::ensure!(!url.trim().is_empty(), "store.url must be non-empty when set");
        }
        if let Some(base) = &self.upstream.base_url {
            anyhow::ensure!(
                base.starts_with("http://") || base.starts_with("https://"),
                "upstream.base_url must be an http(s) URL, got {}",
                base
            );
        }
        anyhow::ensure!(
            self.upstream.rpc_timeout_ms > 0,
            "upstream.rpc_timeout_ms must be > 0, got {}",
            self.upstream.rpc_timeout_ms
        );
        anyhow::ensure!(
            self.upstream.cache_ttl_secs > 0,
            "upstream.cache_ttl_secs must be > 0, got {}",
            self.upstream.cache_ttl_secs
        );
        anyhow::ensure!(
            self.polling.interval_secs > 0,
            "polling.interval_secs must be > 0, got {}",
            self.polling.interval_secs
        );
        anyhow::ensure!(
            self.polling.tick_deadline_secs > 0,
            "polling.tick_deadline_secs must be > 0, got {}",
            self.polling.tick_deadline_secs
        );
        anyhow::ensure!(
            self.polling.tick_deadline_secs <= self.polling.interval_secs,
            "polling.tick_deadline_secs ({}) must not exceed polling.interval_secs ({})",
            self.polling.tick_deadline_secs,
            self.polling.interval_secs
        );
        anyhow::ensure!(
            self.polling.tick_deadline_secs * 1000 >= self.upstream.rpc_timeout_ms,
            "polling.tick_deadline_secs ({}s) must cover upstream.rpc_timeout_ms ({}ms)",
            self.polling.tick_deadline_secs,
            self.upstream.rpc_timeout_ms
        );
        anyhow::ensure!(
            self.polling.max_concurrency > 0,
            "polling.max_concurrency must be > 0, got {}",
            self.polling.max_concurrency
        );
        anyhow::ensure!(
            self.polling.rpc_port > 0,
            "polling.rpc_port must be between 1 and 65535, got {}",
            self.polling.rpc_port
        );
        anyhow::ensure!(
            self.polling.stats_log_interval_secs > 0,
            "polling.stats_log_interval_secs must be > 0, got {}",
            self.polling.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.maintenance.vacuum_interval_secs > 0,
            "maintenance.vacuum_interval_secs must be > 0, got {}",
            self.maintenance.vacuum_interval_secs
        );
        self.node_targets()?;
        Ok(())
    }
}
