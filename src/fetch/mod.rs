use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::dispatch::Endpoint;
use crate::error::Result;

pub mod decode;
pub mod http;
pub mod process;
pub mod request;

pub use http::HttpFetcher;
pub use process::ProcessFetcher;

/// Placeholder passed to the provider when a request has no subject symbol.
pub const NO_SYMBOL: &str = "null";

/// A normalised provider call. `extras` never contains the symbol or cache-control flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub endpoint: Endpoint,
    pub symbol: Option<String>,
    pub extras: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(endpoint: Endpoint, symbol: Option<String>) -> Self {
        Self {
            endpoint,
            symbol,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn symbol_or_placeholder(&self) -> &str {
        self.symbol.as_deref().unwrap_or(NO_SYMBOL)
    }
}

/// Source of market data payloads.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value>;
}

/// Build the fetcher described by `config`.
pub fn build_fetcher(config: &ProviderConfig) -> Result<Arc<dyn Fetcher>> {
    Ok(match config {
        ProviderConfig::Process(process) => Arc::new(ProcessFetcher::new(process.clone())),
        ProviderConfig::Http(http) => Arc::new(HttpFetcher::new(http)?),
    })
}
