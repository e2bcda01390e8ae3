//! Option and result types for counter operations

use super::error::MetricsError;
use super::expiration::{default_expiration_table, ExpirationTable};
use super::granularity::Granularity;
use super::key_encoder::CounterKeyEncoder;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default namespace prefixed to every counter key
pub const DEFAULT_NAMESPACE: &str = "c";

/// Default number of members kept by `trim_events`
pub const DEFAULT_TRIM_LIMIT: usize = 1000;

/// Ranking order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }

    pub fn is_desc(self) -> bool {
        self == Direction::Desc
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(MetricsError::InvalidArgument(format!(
                "direction must be 'asc' or 'desc', got {:?}",
                other
            ))),
        }
    }
}

/// One ranked member and its accumulated score
///
/// Serializes as the single-key map `{"member": score}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankEntry {
    pub member: String,
    pub score: i64,
}

impl RankEntry {
    pub fn new(member: impl Into<String>, score: i64) -> Self {
        RankEntry {
            member: member.into(),
            score,
        }
    }
}

impl Serialize for RankEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.member, &self.score)?;
        map.end()
    }
}

/// Result of `count_range`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RangeCount {
    /// Sum over the whole range
    Total(i64),
    /// ISO 8601 bucket start to count
    Series(BTreeMap<String, i64>),
}

impl RangeCount {
    pub fn total(&self) -> i64 {
        match self {
            RangeCount::Total(n) => *n,
            RangeCount::Series(series) => series.values().sum(),
        }
    }

    pub fn as_series(&self) -> Option<&BTreeMap<String, i64>> {
        match self {
            RangeCount::Series(series) => Some(series),
            RangeCount::Total(_) => None,
        }
    }
}

/// Result of `top_range`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RangeTop {
    /// One ranking merged across the whole range
    Total(Vec<RankEntry>),
    /// ISO 8601 bucket start to that bucket's ranking
    Series(BTreeMap<String, Vec<RankEntry>>),
}

impl RangeTop {
    pub fn as_total(&self) -> Option<&[RankEntry]> {
        match self {
            RangeTop::Total(entries) => Some(entries),
            RangeTop::Series(_) => None,
        }
    }

    pub fn as_series(&self) -> Option<&BTreeMap<String, Vec<RankEntry>>> {
        match self {
            RangeTop::Series(series) => Some(series),
            RangeTop::Total(_) => None,
        }
    }
}

/// Options for `count`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountOptions {
    pub granularity: Granularity,
    pub event_obj: Option<String>,
}

impl CountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn granularity(mut self, granularity: impl Into<Granularity>) -> Self {
        self.granularity = granularity.into();
        self
    }

    pub fn event_obj(mut self, event_obj: impl Into<String>) -> Self {
        self.event_obj = Some(event_obj.into());
        self
    }
}

/// Options for `top` and `top_range`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopOptions {
    pub granularity: Granularity,
    pub direction: Direction,
    /// Ranks to skip
    pub starting_at: usize,
    /// Maximum entries returned; `<= 0` is unlimited
    pub limit: i64,
}

impl Default for TopOptions {
    fn default() -> Self {
        TopOptions {
            granularity: Granularity::None,
            direction: Direction::Desc,
            starting_at: 0,
            limit: -1,
        }
    }
}

impl TopOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn granularity(mut self, granularity: impl Into<Granularity>) -> Self {
        self.granularity = granularity.into();
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn starting_at(mut self, starting_at: usize) -> Self {
        self.starting_at = starting_at;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Inclusive store rank bounds for this slice
    ///
    /// `limit` counts entries, so the stop rank is `starting_at + limit - 1`
    /// rather than `limit` itself.
    pub(crate) fn rank_bounds(&self) -> (i64, i64) {
        let start = i64::try_from(self.starting_at).unwrap_or(i64::MAX);
        let stop = if self.limit > 0 {
            start.saturating_add(self.limit - 1)
        } else {
            -1
        };
        (start, stop)
    }
}

/// Options for `trim_events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimOptions {
    /// Which end of the ranking survives
    pub direction: Direction,
    /// Members kept per ranked set
    pub limit: usize,
}

impl Default for TrimOptions {
    fn default() -> Self {
        TrimOptions {
            direction: Direction::Desc,
            limit: DEFAULT_TRIM_LIMIT,
        }
    }
}

impl TrimOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Ascending rank bounds of the members to remove
    pub(crate) fn removal_bounds(&self) -> (i64, i64) {
        // Leave room for the `-(keep + 1)` stop index
        let keep = i64::try_from(self.limit).map_or(i64::MAX - 1, |keep| keep.min(i64::MAX - 1));
        match self.direction {
            // Keep the highest `keep`: drop everything below them
            Direction::Desc => (0, -(keep + 1)),
            // Keep the lowest `keep`: drop everything above them
            Direction::Asc => (keep, -1),
        }
    }
}

/// Caller-facing counter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterOptions {
    pub namespace: String,
    pub time_granularity: Granularity,
    pub expire_keys: bool,
    /// Per-level TTL overrides; levels left out use the built-in defaults
    pub expiration: ExpirationTable,
}

impl Default for CounterOptions {
    fn default() -> Self {
        CounterOptions {
            namespace: DEFAULT_NAMESPACE.to_string(),
            time_granularity: Granularity::None,
            expire_keys: true,
            expiration: ExpirationTable::new(),
        }
    }
}

impl CounterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn time_granularity(mut self, granularity: impl Into<Granularity>) -> Self {
        self.time_granularity = granularity.into();
        self
    }

    pub fn expire_keys(mut self, expire_keys: bool) -> Self {
        self.expire_keys = expire_keys;
        self
    }

    pub fn expiration(mut self, expiration: ExpirationTable) -> Self {
        self.expiration = expiration;
        self
    }
}

/// Immutable, normalized configuration of one counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterConfig {
    pub event: String,
    pub base_key: String,
    pub granularity: Granularity,
    pub expire_keys: bool,
    /// Built-in defaults with the caller's overrides applied
    pub expiration: ExpirationTable,
}

impl CounterConfig {
    /// Normalize caller options for `event`; the options are left untouched
    pub fn from_options(event: &str, options: &CounterOptions) -> Self {
        let namespace = if options.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            options.namespace.as_str()
        };
        CounterConfig {
            event: event.to_string(),
            base_key: CounterKeyEncoder::base_key(namespace, event),
            granularity: options.time_granularity,
            expire_keys: options.expire_keys,
            expiration: default_expiration_table().overlay(&options.expiration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!("asc".parse::<Direction>().unwrap(), Direction::Asc);
        assert_eq!("desc".parse::<Direction>().unwrap(), Direction::Desc);
        let err = "sideways".parse::<Direction>().unwrap_err();
        assert!(matches!(err, MetricsError::InvalidArgument(_)));
    }

    #[test]
    fn test_rank_entry_serializes_as_single_key_map() {
        let json = serde_json::to_string(&vec![RankEntry::new("A", 5), RankEntry::new("B", 3)]).unwrap();
        assert_eq!(json, r#"[{"A":5},{"B":3}]"#);
    }

    #[test]
    fn test_range_count_serializes_untagged() {
        assert_eq!(serde_json::to_string(&RangeCount::Total(3)).unwrap(), "3");
        let mut series = BTreeMap::new();
        series.insert("2014-01-01T00:00:00Z".to_string(), 1);
        assert_eq!(
            serde_json::to_string(&RangeCount::Series(series)).unwrap(),
            r#"{"2014-01-01T00:00:00Z":1}"#
        );
    }

    #[test]
    fn test_top_rank_bounds() {
        assert_eq!(TopOptions::new().rank_bounds(), (0, -1));
        assert_eq!(TopOptions::new().limit(3).rank_bounds(), (0, 2));
        assert_eq!(TopOptions::new().starting_at(2).limit(3).rank_bounds(), (2, 4));
        assert_eq!(TopOptions::new().starting_at(2).limit(0).rank_bounds(), (2, -1));
    }

    #[test]
    fn test_trim_removal_bounds() {
        assert_eq!(TrimOptions::new().limit(3).removal_bounds(), (0, -4));
        assert_eq!(
            TrimOptions::new().direction(Direction::Asc).limit(3).removal_bounds(),
            (3, -1)
        );
    }

    #[test]
    fn test_huge_limits_do_not_wrap() {
        let (start, stop) = TrimOptions::new().limit(usize::MAX).removal_bounds();
        assert_eq!(start, 0);
        assert_eq!(stop, -i64::MAX);
        assert_eq!(
            TrimOptions::new().direction(Direction::Asc).limit(usize::MAX).removal_bounds(),
            (i64::MAX - 1, -1)
        );
        assert_eq!(
            TopOptions::new().starting_at(usize::MAX).limit(i64::MAX).rank_bounds(),
            (i64::MAX, i64::MAX)
        );
    }

    #[test]
    fn test_counter_config_does_not_mutate_options() {
        let options = CounterOptions::new().namespace("").time_granularity("hour");
        let before = options.clone();
        let config = CounterConfig::from_options("pageview", &options);
        assert_eq!(options, before);
        assert_eq!(config.base_key, "c:pageview");
        assert_eq!(config.granularity, Granularity::Hour);
    }

    #[test]
    fn test_counter_config_holds_effective_expiration() {
        let options = CounterOptions::new()
            .expiration(ExpirationTable::new().with(Granularity::Hour, 60));
        let config = CounterConfig::from_options("pageview", &options);
        assert_eq!(config.expiration.get(Granularity::Hour), Some(60));
        assert_eq!(config.expiration.get(Granularity::Second), Some(600));
        assert_eq!(config.expiration.window(Granularity::Year), None);
        // Caller's table keeps only what it set
        assert_eq!(options.expiration.get(Granularity::Second), None);
    }

    #[test]
    fn test_counter_options_deserialize_tokens() {
        let options: CounterOptions = serde_json::from_str(
            r#"{"namespace":"m","time_granularity":"day","expiration":{"second":30,"D":60}}"#,
        )
        .unwrap();
        assert_eq!(options.time_granularity, Granularity::Day);
        assert!(options.expire_keys);
        assert_eq!(options.expiration.get(Granularity::Second), Some(30));
        assert_eq!(options.expiration.get(Granularity::Day), Some(60));
    }
}
