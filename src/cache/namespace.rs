use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TtlSettings;

/// Logical partition of the cache key space.
///
/// Each namespace carries its own default TTL: live prices are the most
/// volatile and expire first, chart and user data live the longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Price,
    Token,
    Pair,
    Metrics,
    Chart,
    User,
}

impl Namespace {
    pub const ALL: [Namespace; 6] = [
        Namespace::Price,
        Namespace::Token,
        Namespace::Pair,
        Namespace::Metrics,
        Namespace::Chart,
        Namespace::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Price => "price",
            Namespace::Token => "token",
            Namespace::Pair => "pair",
            Namespace::Metrics => "metrics",
            Namespace::Chart => "chart",
            Namespace::User => "user",
        }
    }

    pub fn default_ttl(&self, ttl: &TtlSettings) -> Duration {
        let secs = match self {
            Namespace::Price => ttl.price,
            Namespace::Token => ttl.token,
            Namespace::Pair => ttl.pair,
            Namespace::Metrics => ttl.metrics,
            Namespace::Chart => ttl.chart,
            Namespace::User => ttl.user,
        };
        Duration::from_secs(secs)
    }

    /// Key prefix covering every entry of this namespace.
    pub fn prefix(&self) -> String {
        format!("{}:", self.as_str())
    }

    /// Full cache key: `namespace:id` or `namespace:id:sub_key`.
    pub fn key(&self, id: &str, sub_key: Option<&str>) -> String {
        match sub_key {
            Some(sub) => format!("{}:{}:{}", self.as_str(), id, sub),
            None => format!("{}:{}", self.as_str(), id),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tier(s) a flush applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    Local,
    Shared,
    All,
}

impl CacheLevel {
    pub fn includes_local(&self) -> bool {
        matches!(self, CacheLevel::Local | CacheLevel::All)
    }

    pub fn includes_shared(&self) -> bool {
        matches!(self, CacheLevel::Shared | CacheLevel::All)
    }
}
