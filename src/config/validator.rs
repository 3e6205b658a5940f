use crate::error::{AppError, Result};

use super::{CacheBackendConfig, CacheConfig, Config, ProviderConfig, SchedulerConfig};

/// Slowest accepted refill rate: one token every 1000 seconds.
pub const MIN_REFILL_PER_SEC: f64 = 0.001;

/// Validate a loaded configuration, reporting every problem at once.
pub fn validate_config(config: &Config) -> Result<()> {
    let mut issues = Vec::new();

    validate_scheduler(&config.scheduler, &mut issues);
    validate_cache(&config.cache, &mut issues);
    validate_provider(&config.provider, &mut issues);

    if config.server.bind.trim().is_empty() {
        issues.push("server.bind must not be empty".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::message(format!(
            "relay config invalid:\n  - {}",
            issues.join("\n  - ")
        )))
    }
}

fn validate_scheduler(scheduler: &SchedulerConfig, issues: &mut Vec<String>) {
    if scheduler.capacity == 0 {
        issues.push("scheduler.capacity must be at least 1".to_string());
    }

    if !(scheduler.refill_per_sec.is_finite() && scheduler.refill_per_sec >= MIN_REFILL_PER_SEC) {
        issues.push(format!(
            "scheduler.refill_per_sec must be a number of at least {MIN_REFILL_PER_SEC}, got {}",
            scheduler.refill_per_sec
        ));
    }

    if scheduler.low_priority_limit == 0 {
        issues.push("scheduler.low_priority_limit must be at least 1".to_string());
    }

    if scheduler.low_priority_limit >= scheduler.capacity {
        issues.push(format!(
            "scheduler.low_priority_limit ({}) must be below capacity ({}) to keep a slot for high-priority lookups",
            scheduler.low_priority_limit, scheduler.capacity
        ));
    }

    if scheduler.task_timeout.is_some_and(|timeout| timeout.is_zero()) {
        issues.push("scheduler.task_timeout_ms must be positive when set".to_string());
    }

    if scheduler.max_queue_depth == Some(0) {
        issues.push("scheduler.max_queue_depth must be at least 1 when set".to_string());
    }
}

fn validate_cache(cache: &CacheConfig, issues: &mut Vec<String>) {
    if let CacheBackendConfig::Sqlite { path } = &cache.backend {
        if path.as_os_str().is_empty() {
            issues.push("cache.backend.path must not be empty".to_string());
        }
    }

    for (endpoint, ttl) in &cache.ttls {
        if ttl.is_zero() {
            issues.push(format!("cache.ttl_secs.{endpoint} must be positive"));
        }
    }
}

fn validate_provider(provider: &ProviderConfig, issues: &mut Vec<String>) {
    match provider {
        ProviderConfig::Process(process) => {
            if process.program.trim().is_empty() {
                issues.push("provider.program must not be empty".to_string());
            }
        }
        ProviderConfig::Http(http) => {
            let base = http.base_url.trim();
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                issues.push(format!(
                    "provider.base_url must be an http(s) URL, got `{}`",
                    http.base_url
                ));
            }
            if http.timeout.is_zero() {
                issues.push("provider.timeout_ms must be positive".to_string());
            }
        }
    }
}
