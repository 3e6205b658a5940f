use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde_json::Value;

use crate::config::HttpProviderConfig;
use crate::error::{AppError, Result};

use super::decode::decode_payload;
use super::request::{build_headers, endpoint_url, query_pairs};
use super::{FetchRequest, Fetcher};

/// Calls a REST provider at `GET {base_url}/{endpoint}?symbol=..&extras..`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(config: &HttpProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(build_headers(&config.headers)?)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value> {
        let url = endpoint_url(&self.base_url, request);
        let response = self
            .client
            .get(&url)
            .query(&query_pairs(request))
            .send()
            .await
            .map_err(|err| AppError::upstream(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            warn!("Provider returned {status} for {url}: {}", text.trim());
            return Err(AppError::upstream(format!(
                "provider returned {status} for {}",
                request.endpoint
            )));
        }

        decode_payload(&body)
    }
}
