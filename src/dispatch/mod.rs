//! Request dispatch: validate, consult the cache, and otherwise schedule a
//! provider fetch whose successful result is cached for the endpoint's TTL.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_json::Value;

use crate::cache::{build_cache_key, is_bypass_param, ResponseCache};
use crate::config::CacheConfig;
use crate::error::{AppError, Result};
use crate::fetch::{FetchRequest, Fetcher};
use crate::scheduler::Scheduler;

pub mod endpoint;

pub use endpoint::Endpoint;

const SYMBOL_PARAMS: [&str; 2] = ["symbol", "ticker"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn is_hit(self) -> bool {
        self == CacheStatus::Hit
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
    pub cache: CacheStatus,
}

/// A request that passed validation, ready for the cache and the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedRequest {
    cache_key: String,
    fetch: FetchRequest,
    force_refresh: bool,
}

pub struct Dispatcher {
    cache: ResponseCache,
    scheduler: Scheduler,
    fetcher: Arc<dyn Fetcher>,
    cache_config: CacheConfig,
}

impl Dispatcher {
    pub fn new(
        cache: ResponseCache,
        scheduler: Scheduler,
        fetcher: Arc<dyn Fetcher>,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            cache,
            scheduler,
            fetcher,
            cache_config,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Serve `endpoint` with `params`, from the cache when allowed and fresh.
    ///
    /// `forceRefresh=true` or `noCache=true` in `params` has the same effect as
    /// `force_refresh`. Provider failures are returned unchanged and never cached.
    pub async fn handle(
        &self,
        endpoint: &str,
        params: &HashMap<String, String>,
        force_refresh: bool,
    ) -> Result<DispatchResponse> {
        let request = resolve(endpoint, params, force_refresh)?;

        if request.force_refresh {
            info!("[CACHE BYPASS] {}", request.cache_key);
        } else if let Some(hit) = self.lookup(&request.cache_key).await {
            info!("[CACHE HIT] {}", request.cache_key);
            return Ok(hit);
        } else {
            info!("[CACHE MISS] {}", request.cache_key);
        }

        let endpoint = request.fetch.endpoint;
        let ttl = self.cache_config.ttl_for(endpoint);
        let fetcher = Arc::clone(&self.fetcher);
        let cache = self.cache.clone();
        let ResolvedRequest { cache_key, fetch, .. } = request;
        let key = cache_key.clone();

        // The cache write belongs to the scheduled operation so a caller that
        // goes away after admission still leaves the result behind.
        let (payload, fetched_at) = self
            .scheduler
            .enqueue(endpoint.priority(), move || async move {
                let payload = fetcher.fetch(&fetch).await?;
                let serialized = serde_json::to_string(&payload)?;
                let fetched_at = cache.write(&key, serialized, ttl).await;
                Ok((payload, fetched_at))
            })
            .await
            .map_err(|err| {
                warn!("Fetch failed for {cache_key}: {err}");
                err
            })?;

        Ok(DispatchResponse {
            payload,
            fetched_at,
            cache: CacheStatus::Miss,
        })
    }

    async fn lookup(&self, key: &str) -> Option<DispatchResponse> {
        let entry = self.cache.read(key).await?;
        match serde_json::from_str(&entry.payload) {
            Ok(payload) => Some(DispatchResponse {
                payload,
                fetched_at: entry.fetched_at,
                cache: CacheStatus::Hit,
            }),
            Err(err) => {
                warn!("Discarding unreadable cache entry {key}: {err}");
                self.cache.delete(key);
                None
            }
        }
    }
}

fn resolve(
    endpoint: &str,
    params: &HashMap<String, String>,
    force_refresh: bool,
) -> Result<ResolvedRequest> {
    if endpoint.trim().trim_matches('/').is_empty() {
        return Err(AppError::invalid("no endpoint specified"));
    }
    let endpoint: Endpoint = endpoint.parse()?;

    let symbol = SYMBOL_PARAMS.iter().find_map(|name| non_empty_param(params, name));

    match endpoint.required_param() {
        None => {}
        Some("symbol") if symbol.is_none() => {
            return Err(AppError::invalid(format!("{endpoint} requires a symbol")));
        }
        Some(name) if symbol.is_none() && non_empty_param(params, name).is_none() => {
            return Err(AppError::invalid(format!(
                "{endpoint} requires `{name}` or a symbol"
            )));
        }
        Some(_) => {}
    }

    let extras: BTreeMap<String, String> = params
        .iter()
        .filter(|(name, _)| !is_bypass_param(name) && !SYMBOL_PARAMS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let flagged = |name: &str| params.get(name).is_some_and(|value| value == "true");
    let force_refresh = force_refresh || flagged("forceRefresh") || flagged("noCache");

    Ok(ResolvedRequest {
        cache_key: build_cache_key(endpoint.name(), params),
        fetch: FetchRequest {
            endpoint,
            symbol: symbol.map(str::to_string),
            extras,
        },
        force_refresh,
    })
}

fn non_empty_param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::clock::{Clock, MockClock};
    use crate::config::SchedulerConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        requests: Mutex<Vec<FetchRequest>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(AppError::upstream("provider unavailable"));
            }
            Ok(json!({
                "endpoint": request.endpoint.name(),
                "symbol": request.symbol,
                "call": call,
            }))
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        fetcher: Arc<CountingFetcher>,
        clock: MockClock,
    }

    fn harness(fetcher: CountingFetcher, cache_config: CacheConfig) -> Harness {
        let clock = MockClock::new();
        let fetcher = Arc::new(fetcher);
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), Arc::new(clock.clone()));
        let scheduler = Scheduler::new(&SchedulerConfig::default());
        let dispatcher = Dispatcher::new(
            cache,
            scheduler,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            cache_config,
        );
        Harness {
            dispatcher,
            fetcher,
            clock,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let h = harness(CountingFetcher::default(), CacheConfig::default());
        let query = params(&[("symbol", "AAPL")]);

        let first = h.dispatcher.handle("quote", &query, false).await.unwrap();
        assert_eq!(first.cache, CacheStatus::Miss);

        h.clock.advance(Duration::from_secs(10));
        let second = h.dispatcher.handle("/quote", &query, false).await.unwrap();

        assert_eq!(second.cache, CacheStatus::Hit);
        assert_eq!(second.payload, first.payload);
        assert_eq!(second.fetched_at, first.fetched_at);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_fetches_and_overwrites() {
        let h = harness(CountingFetcher::default(), CacheConfig::default());
        let query = params(&[("symbol", "AAPL")]);

        h.dispatcher.handle("quote", &query, false).await.unwrap();
        let forced = h.dispatcher.handle("quote", &query, true).await.unwrap();
        assert_eq!(forced.cache, CacheStatus::Miss);
        assert_eq!(forced.payload["call"], 2);

        let flagged = params(&[("symbol", "AAPL"), ("noCache", "true")]);
        let bypassed = h.dispatcher.handle("quote", &flagged, false).await.unwrap();
        assert_eq!(bypassed.payload["call"], 3);

        let cached = h.dispatcher.handle("quote", &query, false).await.unwrap();
        assert_eq!(cached.cache, CacheStatus::Hit);
        assert_eq!(cached.payload["call"], 3);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let h = harness(CountingFetcher::default(), CacheConfig::default());
        let query = params(&[("symbol", "AAPL")]);

        h.dispatcher.handle("quote", &query, false).await.unwrap();
        h.clock.advance(Duration::from_secs(60));
        let again = h.dispatcher.handle("quote", &query, false).await.unwrap();

        assert_eq!(again.cache, CacheStatus::Miss);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_returned_and_not_cached() {
        let h = harness(
            CountingFetcher {
                fail: true,
                ..Default::default()
            },
            CacheConfig::default(),
        );
        let query = params(&[("symbol", "AAPL")]);

        for _ in 0..2 {
            let err = h.dispatcher.handle("quote", &query, false).await.unwrap_err();
            assert!(matches!(err, AppError::UpstreamFailure(_)));
        }
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.dispatcher.cache().len().unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_provider() {
        let h = harness(CountingFetcher::default(), CacheConfig::default());

        for (endpoint, query) in [
            ("quote", params(&[])),
            ("candle", params(&[("symbol", "  ")])),
            ("options", params(&[("symbol", "AAPL")])),
            ("", params(&[("symbol", "AAPL")])),
            ("search", params(&[])),
        ] {
            let err = h.dispatcher.handle(endpoint, &query, false).await.unwrap_err();
            assert!(
                matches!(err, AppError::InvalidRequest(_)),
                "{endpoint}: unexpected {err:?}"
            );
        }
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn news_and_search_subjects() {
        let h = harness(CountingFetcher::default(), CacheConfig::default());

        let news = h.dispatcher.handle("news", &params(&[]), false).await.unwrap();
        assert_eq!(news.payload["symbol"], Value::Null);

        h.dispatcher
            .handle("search", &params(&[("q", "apple")]), false)
            .await
            .unwrap();
        h.dispatcher
            .handle("stock/candle", &params(&[("ticker", "MSFT"), ("resolution", "D")]), false)
            .await
            .unwrap();

        let requests = h.fetcher.requests.lock().unwrap();
        assert_eq!(requests[1].extras.get("q").map(String::as_str), Some("apple"));
        assert_eq!(requests[2].endpoint, Endpoint::Candle);
        assert_eq!(requests[2].symbol.as_deref(), Some("MSFT"));
        assert_eq!(requests[2].extras.len(), 1);
    }

    #[tokio::test]
    async fn ttl_floor_extends_short_endpoint_ttls() {
        let mut config = CacheConfig {
            min_ttl: Duration::from_secs(300),
            ..CacheConfig::default()
        };
        config.ttls.insert(Endpoint::Quote, Duration::from_secs(10));
        let h = harness(CountingFetcher::default(), config);
        let query = params(&[("symbol", "AAPL")]);

        h.dispatcher.handle("quote", &query, false).await.unwrap();
        h.clock.advance(Duration::from_secs(299));
        let hit = h.dispatcher.handle("quote", &query, false).await.unwrap();
        assert_eq!(hit.cache, CacheStatus::Hit);

        h.clock.advance(Duration::from_secs(1));
        let miss = h.dispatcher.handle("quote", &query, false).await.unwrap();
        assert_eq!(miss.cache, CacheStatus::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn departed_caller_still_fills_the_cache() {
        let h = harness(
            CountingFetcher {
                delay: Some(Duration::from_millis(100)),
                ..Default::default()
            },
            CacheConfig::default(),
        );
        let query = params(&[("symbol", "AAPL")]);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            h.dispatcher.handle("quote", &query, false),
        )
        .await;
        assert!(abandoned.is_err(), "caller gave up before the fetch finished");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.dispatcher.cache().len().unwrap(), 1);

        let next = h.dispatcher.handle("quote", &query, false).await.unwrap();
        assert_eq!(next.cache, CacheStatus::Hit);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_tokens_refill_while_the_mock_clock_stands_still() {
        let h = harness(CountingFetcher::default(), CacheConfig::default());
        let wall_before = h.clock.now();
        let start = tokio::time::Instant::now();

        let lookups = ["AAPL", "MSFT", "IBM", "NVDA", "AMD", "INTC"].map(|symbol| {
            let query = params(&[("symbol", symbol)]);
            let dispatcher = &h.dispatcher;
            async move { dispatcher.handle("quote", &query, false).await }
        });
        let responses = futures::future::join_all(lookups).await;

        assert!(responses.iter().all(|response| response.is_ok()));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 6);
        // Five burst tokens, then the sixth lookup waits one refill interval.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(510));
        assert_eq!(h.clock.now(), wall_before);
    }

    #[test]
    fn resolve_builds_key_without_bypass_flags() {
        let request = resolve(
            "/stock/profile2",
            &params(&[("symbol", "AAPL"), ("forceRefresh", "true")]),
            false,
        )
        .unwrap();

        assert_eq!(request.cache_key, "profile2?symbol=AAPL");
        assert!(request.force_refresh);
        assert!(request.fetch.extras.is_empty());

        let not_forced = resolve("quote", &params(&[("symbol", "A"), ("noCache", "false")]), false)
            .unwrap();
        assert!(!not_forced.force_refresh);
    }
}
