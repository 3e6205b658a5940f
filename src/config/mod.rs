use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::Endpoint;

pub mod loader;
pub mod validator;

pub use loader::{load_config, resolve_config_path, DEFAULT_CONFIG_PATH};
pub use validator::validate_config;

/// Throttling policy for outbound provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Burst size of the token bucket and the global concurrency ceiling.
    pub capacity: usize,
    pub refill_per_sec: f64,
    /// Concurrency ceiling for Normal-priority work; must stay below `capacity`.
    pub low_priority_limit: usize,
    pub task_timeout: Option<Duration>,
    pub max_queue_depth: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_per_sec: 2.0,
            low_priority_limit: 4,
            task_timeout: Some(Duration::from_secs(30)),
            max_queue_depth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheBackendConfig {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub backend: CacheBackendConfig,
    /// Floor applied to every endpoint TTL.
    pub min_ttl: Duration,
    /// Per-endpoint overrides of [`Endpoint::default_ttl`].
    pub ttls: HashMap<Endpoint, Duration>,
    pub purge_interval: Option<Duration>,
}

impl CacheConfig {
    /// TTL for a fresh `endpoint` payload, never below the configured floor.
    pub fn ttl_for(&self, endpoint: Endpoint) -> Duration {
        self.ttls
            .get(&endpoint)
            .copied()
            .unwrap_or_else(|| endpoint.default_ttl())
            .max(self.min_ttl)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendConfig::Sqlite {
                path: PathBuf::from("data/cache.sqlite"),
            },
            min_ttl: Duration::from_secs(60),
            ttls: HashMap::new(),
            purge_interval: Some(Duration::from_secs(15 * 60)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessProviderConfig {
    pub program: String,
    /// Leading arguments, e.g. the helper script path.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpProviderConfig {
    pub base_url: String,
    /// Header values may reference `${ENV_VAR}` placeholders.
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    Process(ProcessProviderConfig),
    Http(HttpProviderConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Reference deployment: 5 slots, 2 tokens/s, 4 low-priority slots, a
    /// Python helper per fetch and a SQLite cache under `data/`.
    pub fn builtin() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            provider: ProviderConfig::Process(ProcessProviderConfig {
                program: "python3".to_string(),
                args: vec!["helpers/fetch_stock_data.py".to_string()],
            }),
            server: ServerConfig {
                bind: "127.0.0.1:3002".to_string(),
            },
        }
    }
}
