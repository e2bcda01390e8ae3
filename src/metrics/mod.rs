//! Time-Bucketed Event Counters
//!
//! Every increment lands in one key per time level, from the grand total
//! down to the counter's granularity:
//!
//! ```text
//! c:pageview                  total
//! c:pageview:2015             year
//! c:pageview:201503           month
//! c:pageview:20150314         day
//! c:pageview:20150314:z       day, ranked by event object
//! ```
//!
//! - **Counts** read one bucket, or walk the buckets of a date range
//! - **Rankings** keep per-object scores in a sorted set beside each bucket
//! - **Expiry** is set once when a bucket is created, never renewed

mod counter;
mod error;
mod expiration;
mod facade;
mod granularity;
mod key_encoder;
mod parsers;
mod range;
mod types;

pub use counter::{Counter, CLEANUP_LOOKBACK_YEARS};
pub use error::{MetricsError, Result};
pub use expiration::{default_expiration_table, table_from_tokens, ttl_for, ExpirationTable, NO_EXPIRY};
pub use facade::Metrics;
pub use granularity::Granularity;
pub use key_encoder::{CounterKeyEncoder, RANKED_SUFFIX};
pub use parsers::{
    parse_int, parse_range_map, parse_range_total, parse_rank, parse_rank_range,
    parse_rank_total,
};
pub use range::{expand, iso_key, normalize, step, DateLike, TimeRange};
pub use types::{
    CountOptions, CounterConfig, CounterOptions, Direction, RangeCount, RangeTop, RankEntry,
    TopOptions, TrimOptions, DEFAULT_NAMESPACE, DEFAULT_TRIM_LIMIT,
};
