use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{AppError, Context, Result};

use super::FetchRequest;

/// Join the provider base URL and the endpoint path.
pub fn endpoint_url(base_url: &str, request: &FetchRequest) -> String {
    format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        request.endpoint.name()
    )
}

/// Query string pairs: the symbol first, then the extras in key order.
pub fn query_pairs(request: &FetchRequest) -> Vec<(&str, &str)> {
    let mut pairs = Vec::with_capacity(request.extras.len() + 1);
    if let Some(symbol) = request.symbol.as_deref() {
        pairs.push(("symbol", symbol));
    }
    pairs.extend(
        request
            .extras
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    );
    pairs
}

const PLACEHOLDER_OPEN: &str = "${";

/// Replace `${NAME}` placeholders with the named environment variables.
pub fn expand_env_vars(value: &str) -> Result<String> {
    Ok(expand_placeholders(value)?.0)
}

/// Expansion plus whether any placeholder was substituted.
fn expand_placeholders(template: &str) -> Result<(String, bool)> {
    let mut expanded = String::with_capacity(template.len());
    let mut substituted = false;
    let mut rest = template;

    while let Some(open) = rest.find(PLACEHOLDER_OPEN) {
        expanded.push_str(&rest[..open]);
        let after_open = &rest[open + PLACEHOLDER_OPEN.len()..];
        let close = after_open.find('}').ok_or_else(|| {
            AppError::message(format!("provider header `{template}` has an unclosed `${{`"))
        })?;

        let name = after_open[..close].trim();
        if name.is_empty() {
            return Err(AppError::message(format!(
                "provider header `{template}` names no environment variable"
            )));
        }
        let resolved = std::env::var(name)
            .with_context(|| format!("provider header needs ${name}, which is not set"))?;
        expanded.push_str(&resolved);
        substituted = true;

        rest = &after_open[close + 1..];
    }
    expanded.push_str(rest);

    Ok((expanded, substituted))
}

/// Default headers for the HTTP provider. Values filled from the environment
/// are marked sensitive so they stay out of debug output.
pub fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    headers
        .iter()
        .map(|(name, template)| -> Result<(HeaderName, HeaderValue)> {
            let header = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("provider header name `{name}` is not valid"))?;
            let (text, from_env) = expand_placeholders(template)?;
            let mut value = HeaderValue::from_str(&text)
                .with_context(|| format!("provider header `{name}` has an unusable value"))?;
            value.set_sensitive(from_env);
            Ok((header, value))
        })
        .collect()
}
