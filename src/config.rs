//! Top-level config loaded from `freight_engine.toml` (spec §4.5–§4.8 defaults).

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    pub scheduler: SchedulerConfig,
    pub period: PeriodConfig,
    pub store: StoreConfig,
    pub registry_db: RegistryDbConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            scheduler: SchedulerConfig::default(),
            period: PeriodConfig::default(),
            store: StoreConfig::default(),
            registry_db: RegistryDbConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub result_ttl_secs: u64,
    pub reference_ttl_secs: u64,
    pub query_memo_ttl_secs: u64,
    pub lease_duration_secs: u64,
    pub wait_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: 3600,
            reference_ttl_secs: 86_400,
            query_memo_ttl_secs: 900,
            lease_duration_secs: 120,
            wait_timeout_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub retry_attempts: u32,
    pub retry_base_secs: u64,
    /// The ±N% threshold for trend classification (spec §4.4, §9: "a single
    /// configurable constant"). Default matches the spec's default of 1.0.
    pub trend_threshold_percent: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_secs: 1,
            trend_threshold_percent: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    pub worker_pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            worker_pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    pub max_buckets: u32,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self { max_buckets: 10_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    /// Maximum rows fetched per streamed batch (spec §4.1: "bounded memory").
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            clickhouse_url: "http://localhost:8123".to_string(),
            clickhouse_database: "freight".to_string(),
            clickhouse_user: "default".to_string(),
            clickhouse_password: String::new(),
            batch_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryDbConfig {
    pub path: String,
}

impl Default for RegistryDbConfig {
    fn default() -> Self {
        Self {
            path: "./freight_engine.db".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay environment variables the way the teacher's `main.rs` reads
    /// `CLICKHOUSE_URL`/`CLICKHOUSE_DATABASE`/etc, so a container deployment
    /// doesn't need a mounted TOML file just to point at ClickHouse.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CLICKHOUSE_URL") {
            self.store.clickhouse_url = v;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_DATABASE") {
            self.store.clickhouse_database = v;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_USER") {
            self.store.clickhouse_user = v;
        }
        if let Ok(v) = std::env::var("CLICKHOUSE_PASSWORD") {
            self.store.clickhouse_password = v;
        }
        if let Ok(v) = std::env::var("FREIGHT_REGISTRY_DB") {
            self.registry_db.path = v;
        }
        self
    }
}
