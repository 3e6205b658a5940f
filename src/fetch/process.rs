use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use tokio::process::Command;

use crate::config::ProcessProviderConfig;
use crate::error::{AppError, Context, Result};

use super::decode::decode_payload;
use super::{FetchRequest, Fetcher};

/// Runs a helper program once per request and reads its JSON from stdout.
///
/// Invocation: `program [args..] <endpoint> <symbol|null> key=value..`.
#[derive(Debug, Clone)]
pub struct ProcessFetcher {
    config: ProcessProviderConfig,
}

impl ProcessFetcher {
    pub fn new(config: ProcessProviderConfig) -> Self {
        Self { config }
    }

    fn command_args(&self, request: &FetchRequest) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push(request.endpoint.name().to_string());
        args.push(request.symbol_or_placeholder().to_string());
        args.extend(
            request
                .extras
                .iter()
                .map(|(key, value)| format!("{key}={value}")),
        );
        args
    }
}

#[async_trait]
impl Fetcher for ProcessFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value> {
        let args = self.command_args(request);
        debug!("Spawning {} {}", self.config.program, args.join(" "));

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn provider `{}`", self.config.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                "Provider exited with {} for {} {}: {}",
                output.status,
                request.endpoint,
                request.symbol_or_placeholder(),
                stderr
            );
            let detail = if stderr.is_empty() {
                format!("provider exited with {}", output.status)
            } else {
                format!("provider exited with {}: {stderr}", output.status)
            };
            return Err(AppError::upstream(detail));
        }

        decode_payload(&output.stdout)
    }
}
