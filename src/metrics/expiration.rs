//! Key expiration policy
//!
//! Each granularity level has a time-to-live chosen so that only a few
//! hundred buckets of that level are ever live at once. The TTL is attached
//! when a bucket key is created and never refreshed.

use super::granularity::Granularity;
use super::key_encoder::CounterKeyEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const YEAR: i64 = 365 * DAY;

/// Sentinel meaning "never expire"
pub const NO_EXPIRY: i64 = -1;

/// Built-in per-level TTLs in seconds
///
/// | level  | ttl       | live buckets |
/// |--------|-----------|--------------|
/// | total  | never     | 1            |
/// | year   | never     | unbounded    |
/// | month  | 10 years  | 120          |
/// | day    | 2 years   | 730          |
/// | hour   | 31 days   | 744          |
/// | minute | 12 hours  | 720          |
/// | second | 10 min    | 600          |
pub fn default_expiration_table() -> ExpirationTable {
    ExpirationTable::from_entries([
        (Granularity::None, NO_EXPIRY),
        (Granularity::Year, NO_EXPIRY),
        (Granularity::Month, 10 * YEAR),
        (Granularity::Day, 2 * YEAR),
        (Granularity::Hour, 31 * DAY),
        (Granularity::Minute, 12 * HOUR),
        (Granularity::Second, 10 * MINUTE),
    ])
}

/// Seconds-to-live per granularity level; negative means never expire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpirationTable {
    entries: BTreeMap<Granularity, i64>,
}

impl ExpirationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I: IntoIterator<Item = (Granularity, i64)>>(entries: I) -> Self {
        ExpirationTable {
            entries: entries.into_iter().collect(),
        }
    }

    /// Return a copy with `seconds` configured for `granularity`
    pub fn with(mut self, granularity: Granularity, seconds: i64) -> Self {
        self.entries.insert(granularity, seconds);
        self
    }

    /// Raw configured value, if any
    pub fn get(&self, granularity: Granularity) -> Option<i64> {
        self.entries.get(&granularity).copied()
    }

    /// Positive lifetime configured for `granularity`, None to persist
    pub fn window(&self, granularity: Granularity) -> Option<u64> {
        self.get(granularity)
            .and_then(|seconds| u64::try_from(seconds).ok())
            .filter(|seconds| *seconds > 0)
    }

    /// Overlay `overrides` onto this table, returning a new table
    pub fn overlay(&self, overrides: &ExpirationTable) -> ExpirationTable {
        let mut entries = self.entries.clone();
        entries.extend(overrides.entries.iter().map(|(g, s)| (*g, *s)));
        ExpirationTable { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Granularity, i64)> + '_ {
        self.entries.iter().map(|(g, s)| (*g, *s))
    }
}

/// Build a table from granularity tokens (`"second" = 300`, `"6" = 300`)
///
/// Tokens resolve through [`Granularity::resolve`]; later duplicates win.
pub fn table_from_tokens<'a, I>(tokens: I) -> ExpirationTable
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    ExpirationTable::from_entries(
        tokens
            .into_iter()
            .map(|(token, seconds)| (Granularity::resolve(token), seconds)),
    )
}

/// Seconds-to-live for `key`, or None when it must persist
///
/// The level is recovered from the width of the key's timestamp suffix and
/// looked up in `table`, the counter's effective table (defaults already
/// overlaid). A level absent from it, or a negative entry, persists forever.
pub fn ttl_for(
    key: &str,
    base: &str,
    expire_enabled: bool,
    table: &ExpirationTable,
) -> Option<u64> {
    if !expire_enabled {
        return None;
    }
    let granularity = CounterKeyEncoder::decode_granularity(key, base)?;
    table.window(granularity)
}
