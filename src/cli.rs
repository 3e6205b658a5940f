use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "market-relay")]
#[command(about = "Caching, rate-limited relay in front of a market data provider")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Relay configuration file; falls back to built-in defaults when the
    /// default location does not exist.
    #[arg(short, long, env = "RELAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP relay
    Serve {
        /// Override `server.bind` from the config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Fetch one endpoint through the cache and print the JSON payload
    Get {
        /// Endpoint name, e.g. quote, stock/candle, company-news
        endpoint: String,

        /// Query parameters as key=value (e.g. symbol=AAPL resolution=D)
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Skip the cache lookup and overwrite the stored entry
        #[arg(short, long)]
        force: bool,
    },

    /// Delete every cached response
    ClearCache,

    /// Delete expired cached responses
    PurgeCache,

    /// Load and validate the configuration, then print a summary
    CheckConfig,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}
