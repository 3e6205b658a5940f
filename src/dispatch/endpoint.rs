use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::scheduler::Priority;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Logical provider endpoints the relay knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Search,
    Quote,
    Candle,
    Profile,
    CompanyNews,
    News,
    Dividends,
    MarketStatus,
}

impl Endpoint {
    pub const ALL: [Endpoint; 8] = [
        Endpoint::Search,
        Endpoint::Quote,
        Endpoint::Candle,
        Endpoint::Profile,
        Endpoint::CompanyNews,
        Endpoint::News,
        Endpoint::Dividends,
        Endpoint::MarketStatus,
    ];

    /// Resolve a request path such as `/stock/candle` or `quote`.
    pub fn parse(path: &str) -> Option<Self> {
        let trimmed = path.trim().trim_matches('/');
        let name = trimmed.strip_prefix("stock/").unwrap_or(trimmed);
        Self::ALL.into_iter().find(|endpoint| endpoint.name() == name)
    }

    /// Name understood by the data provider.
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Search => "search",
            Endpoint::Quote => "quote",
            Endpoint::Candle => "candle",
            Endpoint::Profile => "profile2",
            Endpoint::CompanyNews => "company-news",
            Endpoint::News => "news",
            Endpoint::Dividends => "dividends",
            Endpoint::MarketStatus => "market-status",
        }
    }

    /// Direct user lookups run ahead of bulk and background refreshes.
    pub fn priority(self) -> Priority {
        match self {
            Endpoint::Search | Endpoint::Quote => Priority::High,
            _ => Priority::Normal,
        }
    }

    pub fn default_ttl(self) -> Duration {
        let secs = match self {
            Endpoint::Search | Endpoint::Quote | Endpoint::News => MINUTE,
            Endpoint::Candle => HOUR,
            Endpoint::Profile | Endpoint::Dividends => DAY,
            Endpoint::CompanyNews => 30 * MINUTE,
            Endpoint::MarketStatus => 15 * MINUTE,
        };
        Duration::from_secs(secs)
    }

    /// Parameter that identifies the subject of the request, if one is required.
    pub fn required_param(self) -> Option<&'static str> {
        match self {
            Endpoint::News | Endpoint::MarketStatus => None,
            Endpoint::Search => Some("q"),
            _ => Some("symbol"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| AppError::invalid(format!("unknown endpoint `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_paths() {
        assert_eq!(Endpoint::parse("/quote"), Some(Endpoint::Quote));
        assert_eq!(Endpoint::parse("stock/candle"), Some(Endpoint::Candle));
        assert_eq!(Endpoint::parse("/stock/profile2"), Some(Endpoint::Profile));
        assert_eq!(Endpoint::parse("company-news"), Some(Endpoint::CompanyNews));
        assert_eq!(Endpoint::parse("options"), None);
        assert!("".parse::<Endpoint>().is_err());
    }

    #[test]
    fn names_round_trip() {
        for endpoint in Endpoint::ALL {
            assert_eq!(Endpoint::parse(endpoint.name()), Some(endpoint));
        }
    }

    #[test]
    fn only_interactive_lookups_are_high_priority() {
        let high: Vec<_> = Endpoint::ALL
            .into_iter()
            .filter(|endpoint| endpoint.priority() == Priority::High)
            .collect();
        assert_eq!(high, vec![Endpoint::Search, Endpoint::Quote]);
    }
}
