use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::dispatch::Endpoint;
use crate::error::{AppError, Context, Result};

use super::{
    validator, CacheBackendConfig, CacheConfig, Config, HttpProviderConfig, ProcessProviderConfig,
    ProviderConfig, SchedulerConfig, ServerConfig,
};

pub const DEFAULT_CONFIG_PATH: &str = "assets/configs/relay.json";

/// Locate `path` as given, next to the executable, or under the working directory.
pub fn resolve_config_path(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }

    let candidates = [
        Some(path.to_path_buf()),
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(path))),
        std::env::current_dir().ok().map(|cwd| cwd.join(path)),
    ];

    candidates.into_iter().flatten().find(|candidate| candidate.exists())
}

/// Load and validate the relay configuration stored at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let resolved = resolve_config_path(path).ok_or_else(|| {
        AppError::message(format!("could not find relay config at {}", path.display()))
    })?;

    let json = fs::read_to_string(&resolved)
        .with_context(|| format!("failed to read relay config at {}", resolved.display()))?;

    let config = parse_config(&json)
        .map_err(|err| AppError::message(format!("{}: {err}", resolved.display())))?;

    validator::validate_config(&config)?;
    Ok(config)
}

/// Parse a JSON document into a [`Config`]; absent sections fall back to [`Config::builtin`].
pub fn parse_config(json: &str) -> Result<Config> {
    let raw: RawConfig =
        serde_json::from_str(json).context("failed to parse relay config JSON")?;
    raw.into_config()
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    scheduler: RawSchedulerConfig,
    #[serde(default)]
    cache: RawCacheConfig,
    #[serde(default)]
    provider: Option<RawProviderConfig>,
    #[serde(default)]
    server: RawServerConfig,
}

impl RawConfig {
    fn into_config(self) -> Result<Config> {
        let builtin = Config::builtin();
        let provider = match self.provider {
            Some(provider) => provider.into_provider_config(),
            None => builtin.provider,
        };

        Ok(Config {
            scheduler: self.scheduler.into_scheduler_config(),
            cache: self.cache.into_cache_config()?,
            provider,
            server: ServerConfig {
                bind: self.server.bind.unwrap_or(builtin.server.bind),
            },
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawSchedulerConfig {
    capacity: Option<usize>,
    refill_per_sec: Option<f64>,
    low_priority_limit: Option<usize>,
    /// `0` disables the per-task deadline.
    task_timeout_ms: Option<u64>,
    max_queue_depth: Option<usize>,
}

impl RawSchedulerConfig {
    fn into_scheduler_config(self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        let task_timeout = match self.task_timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.task_timeout,
        };

        SchedulerConfig {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            refill_per_sec: self.refill_per_sec.unwrap_or(defaults.refill_per_sec),
            low_priority_limit: self.low_priority_limit.unwrap_or(defaults.low_priority_limit),
            task_timeout,
            max_queue_depth: self.max_queue_depth,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawCacheConfig {
    backend: Option<RawCacheBackend>,
    min_ttl_secs: Option<u64>,
    #[serde(default)]
    ttl_secs: HashMap<String, u64>,
    /// `0` disables the background sweeper.
    purge_interval_secs: Option<u64>,
}

impl RawCacheConfig {
    fn into_cache_config(self) -> Result<CacheConfig> {
        let defaults = CacheConfig::default();

        let mut ttls = HashMap::new();
        for (name, secs) in self.ttl_secs {
            let endpoint = Endpoint::parse(&name).ok_or_else(|| {
                AppError::message(format!("cache.ttl_secs has unknown endpoint `{name}`"))
            })?;
            ttls.insert(endpoint, Duration::from_secs(secs));
        }

        let purge_interval = match self.purge_interval_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.purge_interval,
        };

        Ok(CacheConfig {
            backend: self
                .backend
                .map(RawCacheBackend::into_backend)
                .unwrap_or(defaults.backend),
            min_ttl: self
                .min_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.min_ttl),
            ttls,
            purge_interval,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawCacheBackend {
    Memory,
    Sqlite { path: String },
}

impl RawCacheBackend {
    fn into_backend(self) -> CacheBackendConfig {
        match self {
            RawCacheBackend::Memory => CacheBackendConfig::Memory,
            RawCacheBackend::Sqlite { path } => CacheBackendConfig::Sqlite {
                path: PathBuf::from(path),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawProviderConfig {
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Http {
        base_url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl RawProviderConfig {
    fn into_provider_config(self) -> ProviderConfig {
        match self {
            RawProviderConfig::Process { program, args } => {
                ProviderConfig::Process(ProcessProviderConfig { program, args })
            }
            RawProviderConfig::Http {
                base_url,
                headers,
                timeout_ms,
            } => ProviderConfig::Http(HttpProviderConfig {
                base_url,
                headers,
                timeout: Duration::from_millis(timeout_ms),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawServerConfig {
    bind: Option<String>,
}
