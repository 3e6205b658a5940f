use serde_json::Value;

use crate::error::{AppError, Result};

const PREVIEW_LEN: usize = 120;

/// Decode a provider body into JSON, surfacing provider-reported errors.
///
/// Bodies that are not JSON map to `MalformedUpstreamResponse`; an object with
/// a non-null `error` field maps to `UpstreamFailure` carrying that message.
pub fn decode_payload(body: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        AppError::malformed(format!("{err} (body starts with `{}`)", preview(body)))
    })?;

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        let message = match error {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(AppError::upstream(message));
    }

    Ok(value)
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_objects_and_arrays() {
        assert_eq!(decode_payload(br#"{"c": 187.2}"#).unwrap(), json!({"c": 187.2}));
        assert_eq!(decode_payload(b"[1, 2]").unwrap(), json!([1, 2]));
    }

    #[test]
    fn error_field_is_an_upstream_failure() {
        let err = decode_payload(br#"{"error": "No data found for ZZZZ"}"#).unwrap_err();
        assert!(matches!(&err, AppError::UpstreamFailure(msg) if msg == "No data found for ZZZZ"));
    }

    #[test]
    fn null_error_field_is_ignored() {
        assert!(decode_payload(br#"{"error": null, "c": 1}"#).is_ok());
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode_payload(b"Traceback (most recent call last):").unwrap_err();
        match err {
            AppError::MalformedUpstreamResponse(msg) => assert!(msg.contains("Traceback")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
