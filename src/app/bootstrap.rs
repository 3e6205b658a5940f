use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::{CacheStore, MemoryStore, ResponseCache, SqliteStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheBackendConfig, CacheConfig, Config};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::fetch::{build_fetcher, Fetcher};
use crate::scheduler::Scheduler;

/// Fully wired relay: cache, scheduler and provider behind one dispatcher.
pub struct Relay {
    config: Config,
    dispatcher: Arc<Dispatcher>,
}

impl Relay {
    /// Wire the relay from `config` with the system clock and the configured
    /// provider. Must run inside a tokio runtime.
    pub fn build(config: Config) -> Result<Self> {
        let fetcher = build_fetcher(&config.provider)?;
        Self::build_with(config, Arc::new(SystemClock::new()), fetcher)
    }

    pub fn build_with(
        config: Config,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let cache = open_cache(&config.cache, clock)?;
        let scheduler = Scheduler::new(&config.scheduler);
        let dispatcher = Dispatcher::new(cache, scheduler, fetcher, config.cache.clone());

        info!(
            "Relay ready: capacity {}, {} tokens/s, {} low-priority slots",
            config.scheduler.capacity,
            config.scheduler.refill_per_sec,
            config.scheduler.low_priority_limit
        );

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Start the periodic expired-entry sweep if one is configured.
    pub fn spawn_purge_sweeper(&self) -> Option<JoinHandle<()>> {
        let period = self.config.cache.purge_interval?;
        Some(spawn_purge_sweeper(self.dispatcher.cache().clone(), period))
    }
}

pub fn open_store(backend: &CacheBackendConfig) -> Result<Arc<dyn CacheStore>> {
    Ok(match backend {
        CacheBackendConfig::Memory => Arc::new(MemoryStore::new()),
        CacheBackendConfig::Sqlite { path } => {
            debug!("Opening SQLite cache at {}", path.display());
            Arc::new(SqliteStore::open(path)?)
        }
    })
}

pub fn open_cache(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<ResponseCache> {
    Ok(ResponseCache::new(open_store(&config.backend)?, clock))
}

fn spawn_purge_sweeper(cache: ResponseCache, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let sweep = cache.clone();
            match tokio::task::spawn_blocking(move || sweep.purge_expired()).await {
                Ok(Ok(0)) => debug!("Cache sweep found nothing to purge"),
                Ok(Ok(removed)) => info!("Purged {removed} expired cache entr(ies)"),
                Ok(Err(err)) => warn!("Cache sweep failed: {err}"),
                Err(join_err) => warn!("Cache sweep task failed: {join_err}"),
            }
        }
    })
}
