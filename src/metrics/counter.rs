//! Time-bucketed counter
//!
//! A [`Counter`] writes every increment into one bucket per level, from the
//! grand total down to its configured granularity, and answers totals,
//! per-bucket breakdowns and top-N rankings from those buckets.
//!
//! Counters hold only immutable configuration. All state lives in the
//! store, so clones and independent counters over the same key are safe to
//! use concurrently.

use super::error::{MetricsError, Result};
use super::expiration::ttl_for;
use super::granularity::Granularity;
use super::key_encoder::CounterKeyEncoder;
use super::parsers::{
    parse_int, parse_range_map, parse_range_total, parse_rank, parse_rank_range,
    parse_rank_total,
};
use super::range::{expand, iso_key, TimeRange};
use super::types::{
    CountOptions, CounterConfig, CounterOptions, RangeCount, RangeTop, RankEntry, TopOptions,
    TrimOptions,
};
use crate::store::{Clock, Store, StoreCommand, StoreReply};
use ahash::AHashSet;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// How far back `trim_events` and `zero` look for buckets
pub const CLEANUP_LOOKBACK_YEARS: i64 = 5;

/// A named, time-bucketed counter over a shared store
pub struct Counter<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: CounterConfig,
}

impl<S: Store> Clone for Counter<S> {
    fn clone(&self) -> Self {
        Counter {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> std::fmt::Debug for Counter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counter").field("config", &self.config).finish()
    }
}

impl<S: Store> Counter<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, event: &str, options: &CounterOptions) -> Self {
        Counter {
            store,
            clock,
            config: CounterConfig::from_options(event, options),
        }
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    pub fn base_key(&self) -> &str {
        &self.config.base_key
    }

    pub fn granularity(&self) -> Granularity {
        self.config.granularity
    }

    /// Keys an increment would write right now
    pub fn keys(&self) -> Vec<String> {
        self.keys_at(self.clock.now(), None)
    }

    /// Keys active at `instant`, down to `granularity` (default: the counter's)
    pub fn keys_at(&self, instant: DateTime<Utc>, granularity: Option<Granularity>) -> Vec<String> {
        CounterKeyEncoder::keys_for(
            &self.config.base_key,
            instant,
            granularity.unwrap_or(self.config.granularity),
        )
    }

    /// Seconds-to-live applied when `key` is created, None to persist
    pub fn ttl_for(&self, key: &str) -> Option<u64> {
        ttl_for(
            key,
            &self.config.base_key,
            self.config.expire_keys,
            &self.config.expiration,
        )
    }

    /// Add one to every bucket
    pub async fn incr(&self) -> Result<Vec<i64>> {
        self.increment(1, None).await
    }

    /// Add `amount` to every bucket, or to `event_obj`'s score in every
    /// bucket's ranked set
    ///
    /// Returns the post-increment value of each bucket, least to most
    /// specific. Multiple buckets are written in one atomic batch.
    pub async fn increment(&self, amount: i64, event_obj: Option<&str>) -> Result<Vec<i64>> {
        if amount < 1 {
            return Err(MetricsError::InvalidArgument(format!(
                "increment amount must be at least 1, got {}",
                amount
            )));
        }

        let commands: Vec<StoreCommand> = self
            .keys()
            .into_iter()
            .map(|key| {
                let ttl_secs = self.ttl_for(&key);
                match event_obj {
                    Some(member) => StoreCommand::ZIncrBy {
                        key: CounterKeyEncoder::ranked_key(&key),
                        member: member.to_string(),
                        amount,
                        ttl_secs,
                    },
                    None => StoreCommand::IncrBy {
                        key,
                        amount,
                        ttl_secs,
                    },
                }
            })
            .collect();

        debug!(
            counter = %self.config.base_key,
            amount,
            event_obj,
            keys = commands.len(),
            "increment"
        );

        let replies = self.run(commands).await?;
        Ok(replies.iter().map(parse_int).collect())
    }

    /// Current value of the bucket for `options.granularity` (default total)
    ///
    /// Levels finer than the counter's own are never written and read as 0.
    pub async fn count(&self, options: CountOptions) -> Result<i64> {
        let key = CounterKeyEncoder::bucket_key(
            &self.config.base_key,
            self.clock.now(),
            options.granularity,
        );
        debug!(counter = %self.config.base_key, %key, "count");

        let command = match options.event_obj {
            Some(member) => StoreCommand::ZScore {
                key: CounterKeyEncoder::ranked_key(&key),
                member,
            },
            None => StoreCommand::Get { key },
        };
        let reply = self.store.execute(command).await?;
        Ok(parse_int(&reply))
    }

    /// Counts per bucket over `range`, or their sum when `granularity` is total
    pub async fn count_range(
        &self,
        granularity: impl Into<Granularity>,
        range: &TimeRange,
        event_obj: Option<&str>,
    ) -> Result<RangeCount> {
        let report = granularity.into();
        let query = self.query_granularity(report)?;
        let (start, end) = range.resolve(self.clock.now())?;
        let instants = expand(start, end, query);
        let keys: Vec<String> = instants
            .iter()
            .map(|t| CounterKeyEncoder::bucket_key(&self.config.base_key, *t, query))
            .collect();

        debug!(
            counter = %self.config.base_key,
            report = %report,
            query = %query,
            buckets = keys.len(),
            "count_range"
        );

        let replies = match event_obj {
            None if keys.is_empty() => Vec::new(),
            None => self
                .store
                .execute(StoreCommand::MGet { keys })
                .await?
                .into_array()?,
            Some(member) => {
                let commands = keys
                    .into_iter()
                    .map(|key| StoreCommand::ZScore {
                        key: CounterKeyEncoder::ranked_key(&key),
                        member: member.to_string(),
                    })
                    .collect();
                self.run(commands).await?
            }
        };

        if report.is_total() {
            Ok(RangeCount::Total(parse_range_total(&replies)))
        } else {
            let timestamps: Vec<String> = instants.into_iter().map(iso_key).collect();
            Ok(RangeCount::Series(parse_range_map(&timestamps, &replies)))
        }
    }

    /// Ranked event objects in the current bucket for `options.granularity`
    ///
    /// `limit` is a count: `limit(3)` returns at most three entries, read
    /// from store ranks `starting_at ..= starting_at + limit - 1`.
    pub async fn top(&self, options: TopOptions) -> Result<Vec<RankEntry>> {
        let key = CounterKeyEncoder::bucket_key(
            &self.config.base_key,
            self.clock.now(),
            options.granularity,
        );
        let (start, stop) = options.rank_bounds();
        debug!(counter = %self.config.base_key, %key, direction = %options.direction, "top");

        let reply = self
            .store
            .execute(StoreCommand::ZRange {
                key: CounterKeyEncoder::ranked_key(&key),
                start,
                stop,
                rev: options.direction.is_desc(),
            })
            .await?;
        Ok(parse_rank(&reply))
    }

    /// Rankings per bucket over `range`, or one ranking merged across the
    /// range when `options.granularity` is total
    pub async fn top_range(&self, range: &TimeRange, options: TopOptions) -> Result<RangeTop> {
        let report = options.granularity;
        let query = self.query_granularity(report)?;
        let (start, end) = range.resolve(self.clock.now())?;
        let instants = expand(start, end, query);

        // Merged rankings need every member of every bucket; slice afterwards
        let (rank_start, rank_stop) = if report.is_total() {
            (0, -1)
        } else {
            options.rank_bounds()
        };
        let commands: Vec<StoreCommand> = instants
            .iter()
            .map(|t| StoreCommand::ZRange {
                key: CounterKeyEncoder::ranked_key(&CounterKeyEncoder::bucket_key(
                    &self.config.base_key,
                    *t,
                    query,
                )),
                start: rank_start,
                stop: rank_stop,
                rev: options.direction.is_desc(),
            })
            .collect();

        debug!(
            counter = %self.config.base_key,
            report = %report,
            query = %query,
            buckets = commands.len(),
            "top_range"
        );

        let replies = self.run(commands).await?;
        if report.is_total() {
            Ok(RangeTop::Total(parse_rank_total(
                &replies,
                options.direction,
                options.starting_at,
                options.limit,
            )))
        } else {
            let timestamps: Vec<String> = instants.into_iter().map(iso_key).collect();
            Ok(RangeTop::Series(parse_rank_range(&timestamps, &replies)))
        }
    }

    /// Keep only the top (or bottom) `options.limit` event objects
    ///
    /// Touches the total, year, month and day sets over the last five years;
    /// finer sets are left alone. Keys are trimmed one after another and the
    /// number of removed members is returned.
    ///
    /// Trimming often can freeze the ranking: members below the cut are
    /// evicted before they get a chance to accumulate score.
    pub async fn trim_events(&self, options: TrimOptions) -> Result<i64> {
        let keys = if self.config.granularity.is_total() {
            vec![self.config.base_key.clone()]
        } else {
            let level = self.config.granularity.min(Granularity::Day);
            let now = self.clock.now();
            let start = lookback_start(now, CLEANUP_LOOKBACK_YEARS * 365 * 24 * 3600);
            dedup(
                expand(start, now, Granularity::Day)
                    .into_iter()
                    .flat_map(|t| self.keys_at(t, Some(level))),
            )
        };

        let (start, stop) = options.removal_bounds();
        debug!(
            counter = %self.config.base_key,
            keys = keys.len(),
            direction = %options.direction,
            limit = options.limit,
            "trim_events"
        );

        let mut removed = 0i64;
        for key in &keys {
            let command = StoreCommand::ZRemRangeByRank {
                key: CounterKeyEncoder::ranked_key(key),
                start,
                stop,
            };
            match self.store.execute(command).await {
                Ok(reply) => removed += parse_int(&reply),
                Err(e) => {
                    warn!(
                        counter = %self.config.base_key,
                        %key,
                        removed,
                        error = %e,
                        "trim_events aborted"
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(removed)
    }

    /// Reset every bucket to zero, or drop `event_obj` from every ranked set
    ///
    /// Walks each level back five years, or back one TTL for levels whose
    /// keys expire sooner, deleting keys one after another.
    pub async fn zero(&self, event_obj: Option<&str>) -> Result<()> {
        let now = self.clock.now();
        let five_years = CLEANUP_LOOKBACK_YEARS * 365 * 24 * 3600;
        let keys = dedup(
            Granularity::ALL[..=self.config.granularity.ordinal()]
                .iter()
                .flat_map(|&level| {
                    // Keys written while expiry was on may still be live
                    let window = match self.config.expiration.window(level) {
                        Some(ttl) => five_years.min(i64::try_from(ttl).unwrap_or(i64::MAX)),
                        None => five_years,
                    };
                    expand(lookback_start(now, window), now, level)
                        .into_iter()
                        .map(move |t| CounterKeyEncoder::bucket_key(&self.config.base_key, t, level))
                }),
        );

        debug!(
            counter = %self.config.base_key,
            keys = keys.len(),
            event_obj,
            "zero"
        );

        for (done, key) in keys.iter().enumerate() {
            let command = match event_obj {
                Some(member) => StoreCommand::ZRem {
                    key: CounterKeyEncoder::ranked_key(key),
                    member: member.to_string(),
                },
                None => StoreCommand::Del { key: key.clone() },
            };
            if let Err(e) = self.store.execute(command).await {
                warn!(
                    counter = %self.config.base_key,
                    %key,
                    cleared = done,
                    error = %e,
                    "zero aborted"
                );
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Granularity to walk buckets at for a range query reported at `report`
    fn query_granularity(&self, report: Granularity) -> Result<Granularity> {
        if !report.is_total() {
            return Ok(report);
        }
        if self.config.granularity.is_total() {
            return Err(MetricsError::InvalidArgument(format!(
                "cannot query a range at granularity 'total' on counter {:?} \
                 whose time granularity is also 'none'",
                self.config.base_key
            )));
        }
        Ok(self.config.granularity)
    }

    /// One command runs alone; several run as one atomic batch
    async fn run(&self, mut commands: Vec<StoreCommand>) -> Result<Vec<StoreReply>> {
        match commands.len() {
            0 => Ok(Vec::new()),
            1 => {
                let command = commands.remove(0);
                Ok(vec![self.store.execute(command).await?])
            }
            _ => Ok(self.store.execute_batch(commands).await?),
        }
    }
}

fn lookback_start(now: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::seconds(seconds))
        .unwrap_or(now)
}

/// Drop repeated keys, keeping first-seen order
fn dedup(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = AHashSet::new();
    keys.into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
