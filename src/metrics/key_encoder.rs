//! Key encoding for counter storage
//!
//! Maps a counter, a granularity and an instant onto Redis keys.
//!
//! Key format: `<namespace>:<event>[:<timestamp prefix>][:z]`
//!
//! The timestamp prefix is the UTC `YYYYMMDDhhmmss` rendering of the
//! instant truncated to the level's width, so its length alone identifies
//! the level. Ranked (event object) counters live in a sorted set at the
//! same key with a `:z` suffix.
//!
//! Examples:
//! - `c:pageview` (grand total)
//! - `c:pageview:2015` (year)
//! - `c:pageview:20150314` (day)
//! - `c:pageview:20150314:z` (day, ranked by event object)

use super::granularity::Granularity;
use chrono::{DateTime, Utc};

/// Suffix appended to a bucket key to address its ranked set
pub const RANKED_SUFFIX: &str = ":z";

/// Encodes counter bucket keys
pub struct CounterKeyEncoder;

impl CounterKeyEncoder {
    /// Base key for a counter: `<namespace>:<event>`
    pub fn base_key(namespace: &str, event: &str) -> String {
        format!("{}:{}", namespace, event)
    }

    /// Full-width `YYYYMMDDhhmmss` timestamp for an instant
    pub fn timestamp(instant: DateTime<Utc>) -> String {
        instant.format("%Y%m%d%H%M%S").to_string()
    }

    /// Keys active at `instant`, least to most specific
    ///
    /// Always starts with `base`; `result[g]` addresses level `g`, so the
    /// result holds `granularity.ordinal() + 1` keys.
    pub fn keys_for(base: &str, instant: DateTime<Utc>, granularity: Granularity) -> Vec<String> {
        let mut keys = Vec::with_capacity(granularity.ordinal() + 1);
        keys.push(base.to_string());
        if granularity.is_total() {
            return keys;
        }

        let timestamp = Self::timestamp(instant);
        for level in &Granularity::ALL[1..=granularity.ordinal()] {
            keys.push(format!("{}:{}", base, &timestamp[..level.timestamp_width()]));
        }
        keys
    }

    /// The single most specific key for `granularity` at `instant`
    pub fn bucket_key(base: &str, instant: DateTime<Utc>, granularity: Granularity) -> String {
        if granularity.is_total() {
            return base.to_string();
        }
        let timestamp = Self::timestamp(instant);
        format!("{}:{}", base, &timestamp[..granularity.timestamp_width()])
    }

    /// Sorted-set key for a bucket key
    pub fn ranked_key(key: &str) -> String {
        format!("{}{}", key, RANKED_SUFFIX)
    }

    /// Timestamp suffix of `key` relative to `base`
    ///
    /// Empty for the base key itself; None when `key` does not belong to
    /// `base`.
    pub fn timestamp_suffix<'a>(key: &'a str, base: &str) -> Option<&'a str> {
        let rest = key.strip_prefix(base)?;
        if rest.is_empty() {
            return Some(rest);
        }
        rest.strip_prefix(':')
    }

    /// Granularity encoded in `key`, recovered from its suffix width
    pub fn decode_granularity(key: &str, base: &str) -> Option<Granularity> {
        let suffix = Self::timestamp_suffix(key, base)?;
        if !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Granularity::from_timestamp_width(suffix.len())
    }
}
