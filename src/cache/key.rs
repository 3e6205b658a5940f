use std::collections::BTreeMap;
use std::collections::HashMap;

use url::form_urlencoded;

/// Query parameters that change how a request is served but not what it asks for.
pub const BYPASS_PARAMS: &[&str] = &["forceRefresh", "noCache"];

pub fn is_bypass_param(name: &str) -> bool {
    BYPASS_PARAMS.contains(&name)
}

/// Build the cache identity of `endpoint` + `params`.
///
/// Parameter names are sorted so that equivalent requests collide regardless of
/// the order the caller supplied them in, and bypass flags are dropped. Names
/// and values are form-encoded, so a value holding `&` or `=` cannot pose as
/// extra parameters.
pub fn build_cache_key(endpoint: &str, params: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .iter()
        .filter(|(name, _)| !is_bypass_param(name))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(sorted)
        .finish();

    format!("{endpoint}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn permutations_share_a_key() {
        let pairs = [
            ("symbol", "AAPL"),
            ("resolution", "D"),
            ("from", "1700000000"),
            ("to", "1710000000"),
        ];
        let expected = build_cache_key("candle", &params(&pairs));

        let mut rotated = pairs.to_vec();
        for _ in 0..pairs.len() {
            rotated.rotate_left(1);
            assert_eq!(build_cache_key("candle", &params(&rotated)), expected);
        }
        rotated.reverse();
        assert_eq!(build_cache_key("candle", &params(&rotated)), expected);
        assert_eq!(
            expected,
            "candle?from=1700000000&resolution=D&symbol=AAPL&to=1710000000"
        );
    }

    #[test]
    fn embedded_separators_cannot_forge_a_key() {
        let smuggled = build_cache_key("search", &params(&[("q", "apple&region=US")]));
        let separate = build_cache_key("search", &params(&[("q", "apple"), ("region", "US")]));

        assert_ne!(smuggled, separate);
        assert_eq!(smuggled, "search?q=apple%26region%3DUS");
        assert_eq!(separate, "search?q=apple&region=US");
    }

    #[test]
    fn bypass_flags_are_excluded() {
        let base = params(&[("symbol", "AAPL")]);
        let forced = params(&[("symbol", "AAPL"), ("forceRefresh", "true")]);
        let no_cache = params(&[("noCache", "true"), ("symbol", "AAPL")]);

        let key = build_cache_key("quote", &base);
        assert_eq!(build_cache_key("quote", &forced), key);
        assert_eq!(build_cache_key("quote", &no_cache), key);
    }

    #[test]
    fn endpoint_is_part_of_identity() {
        let p = params(&[("symbol", "MSFT")]);
        assert_ne!(build_cache_key("quote", &p), build_cache_key("dividends", &p));
        assert_eq!(build_cache_key("news", &HashMap::new()), "news?");
    }
}
