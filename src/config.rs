//! Metrics Configuration
//!
//! Loaded from a TOML document or from environment variables:
//!
//! - `TALLY_REDIS_URL`: Redis connection URL (default: redis://127.0.0.1:6379/0)
//! - `TALLY_NAMESPACE`: Default counter namespace (default: c)
//! - `TALLY_EXPIRE_KEYS`: Expire time-bucketed keys (default: true)
//! - `TALLY_LOG_FORMAT`: `text` or `json` (default: text)
//!
//! Expiration overrides are only read from TOML, keyed by granularity token:
//!
//! ```toml
//! redis_url = "redis://cache:6379/2"
//! namespace = "m"
//!
//! [expiration]
//! second = 300
//! h = 86400
//! ```

use crate::metrics::{table_from_tokens, CounterOptions, DEFAULT_NAMESPACE};
use crate::observability::LogFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

/// Process-wide counter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub redis_url: String,
    /// Namespace for counters that don't name one
    pub namespace: String,
    pub expire_keys: bool,
    /// Granularity token to seconds; negative keeps keys forever
    pub expiration: BTreeMap<String, i64>,
    pub log_format: LogFormat,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            expire_keys: true,
            expiration: BTreeMap::new(),
            log_format: LogFormat::Text,
        }
    }
}

impl MetricsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = MetricsConfig::default();
        MetricsConfig {
            redis_url: std::env::var("TALLY_REDIS_URL").unwrap_or(defaults.redis_url),
            namespace: std::env::var("TALLY_NAMESPACE")
                .ok()
                .filter(|ns| !ns.is_empty())
                .unwrap_or(defaults.namespace),
            expire_keys: std::env::var("TALLY_EXPIRE_KEYS")
                .map(|v| !(v == "false" || v == "0"))
                .unwrap_or(defaults.expire_keys),
            expiration: defaults.expiration,
            log_format: std::env::var("TALLY_LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
        }
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Options new counters start from
    pub fn counter_options(&self) -> CounterOptions {
        CounterOptions::new()
            .namespace(self.namespace.clone())
            .expire_keys(self.expire_keys)
            .expiration(table_from_tokens(
                self.expiration.iter().map(|(token, secs)| (token.as_str(), *secs)),
            ))
    }
}
