mod cli;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;

use cli::{Cli, Commands};
use market_relay::app::{open_cache, Relay};
use market_relay::clock::SystemClock;
use market_relay::config::{
    load_config, resolve_config_path, CacheBackendConfig, Config, ProviderConfig,
    DEFAULT_CONFIG_PATH,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = read_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await?,
        Commands::Get {
            endpoint,
            params,
            force,
        } => get(config, &endpoint, params, force).await?,
        Commands::ClearCache => {
            let cache = open_cache(&config.cache, Arc::new(SystemClock::new()))?;
            let removed = cache.delete_all().context("failed to clear cache")?;
            println!("Removed {removed} cached response(s).");
        }
        Commands::PurgeCache => {
            let cache = open_cache(&config.cache, Arc::new(SystemClock::new()))?;
            let removed = cache.purge_expired().context("failed to purge cache")?;
            println!("Purged {removed} expired response(s).");
        }
        Commands::CheckConfig => print_summary(&config),
    }

    Ok(())
}

/// An explicit path must exist; the default path is optional.
fn read_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    if resolve_config_path(default).is_some() {
        return Ok(load_config(default)?);
    }

    warn!("No config found at {DEFAULT_CONFIG_PATH}; using built-in defaults");
    Ok(Config::builtin())
}

async fn serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let addr = config.server.bind.clone();

    let relay = Relay::build(config)?;
    let sweeper = relay.spawn_purge_sweeper();

    let result = market_relay::server::serve(relay.dispatcher(), &addr).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(result?)
}

async fn get(
    config: Config,
    endpoint: &str,
    params: Vec<(String, String)>,
    force: bool,
) -> Result<()> {
    let relay = Relay::build(config)?;
    let params: HashMap<String, String> = params.into_iter().collect();

    let response = relay.dispatcher().handle(endpoint, &params, force).await?;

    eprintln!(
        "{} (fetched {})",
        if response.cache.is_hit() { "cache hit" } else { "fetched from provider" },
        response.fetched_at.to_rfc3339()
    );
    println!("{}", serde_json::to_string_pretty(&response.payload)?);
    Ok(())
}

fn print_summary(config: &Config) {
    let scheduler = &config.scheduler;
    println!("Configuration OK");
    println!(
        "  scheduler: capacity {}, {} tokens/s, {} low-priority slots",
        scheduler.capacity, scheduler.refill_per_sec, scheduler.low_priority_limit
    );
    match scheduler.task_timeout {
        Some(timeout) => println!("  task timeout: {timeout:?}"),
        None => println!("  task timeout: none"),
    }
    match scheduler.max_queue_depth {
        Some(depth) => println!("  max queue depth: {depth}"),
        None => println!("  max queue depth: unbounded"),
    }

    match &config.cache.backend {
        CacheBackendConfig::Memory => println!("  cache: in-memory"),
        CacheBackendConfig::Sqlite { path } => println!("  cache: sqlite at {}", path.display()),
    }
    println!("  minimum ttl: {:?}", config.cache.min_ttl);

    match &config.provider {
        ProviderConfig::Process(process) => println!(
            "  provider: {} {}",
            process.program,
            process.args.join(" ")
        ),
        ProviderConfig::Http(http) => println!("  provider: {}", http.base_url),
    }
    println!("  bind: {}", config.server.bind);
}
