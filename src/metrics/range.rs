//! Date ranges and bucket expansion
//!
//! A range query walks one representative instant per bucket. Both ends
//! are first truncated to the start of their bucket so the walk lines up
//! with the keys increments actually wrote.

use super::error::{MetricsError, Result};
use super::granularity::Granularity;
use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};

/// Anything that can name an instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateLike {
    /// Unix epoch milliseconds
    EpochMillis(i64),
    /// RFC 3339, `YYYY-MM-DD[ T]HH:MM:SS`, `YYYY-MM-DD`, `YYYY-MM` or `YYYY`
    Text(String),
    Instant(DateTime<Utc>),
}

impl DateLike {
    /// Resolve to a UTC instant
    pub fn to_instant(&self) -> Result<DateTime<Utc>> {
        match self {
            DateLike::Instant(t) => Ok(*t),
            DateLike::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms).ok_or_else(|| {
                MetricsError::InvalidArgument(format!("epoch millis out of range: {}", ms))
            }),
            DateLike::Text(text) => parse_text(text),
        }
    }
}

fn parse_text(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    let date = match text.len() {
        4 => text
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        7 => NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
    };
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| Utc.from_utc_datetime(&t))
        .ok_or_else(|| MetricsError::InvalidArgument(format!("unrecognized date: {:?}", text)))
}

impl From<DateTime<Utc>> for DateLike {
    fn from(t: DateTime<Utc>) -> Self {
        DateLike::Instant(t)
    }
}

impl From<i64> for DateLike {
    fn from(ms: i64) -> Self {
        DateLike::EpochMillis(ms)
    }
}

impl From<&str> for DateLike {
    fn from(text: &str) -> Self {
        DateLike::Text(text.to_string())
    }
}

impl From<String> for DateLike {
    fn from(text: String) -> Self {
        DateLike::Text(text)
    }
}

impl From<NaiveDate> for DateLike {
    fn from(date: NaiveDate) -> Self {
        DateLike::Instant(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::default())))
    }
}

/// Query window; `end` defaults to now
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateLike>,
    pub end: Option<DateLike>,
}

impl TimeRange {
    /// Range from `start` until now
    pub fn since(start: impl Into<DateLike>) -> Self {
        TimeRange {
            start: Some(start.into()),
            end: None,
        }
    }

    /// Range from `start` to `end`, both inclusive
    pub fn between(start: impl Into<DateLike>, end: impl Into<DateLike>) -> Self {
        TimeRange {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    /// Resolve both ends, defaulting `end` to `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self
            .start
            .as_ref()
            .ok_or_else(|| MetricsError::InvalidArgument("startDate is required".to_string()))?
            .to_instant()?;
        let end = match &self.end {
            Some(end) => end.to_instant()?,
            None => now,
        };
        Ok((start, end))
    }
}

/// Truncate `instant` to the start of its bucket at `granularity`
///
/// `None` leaves the instant untouched.
pub fn normalize(instant: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let (month, day, hour, minute, second) = match granularity {
        Granularity::None => return instant,
        Granularity::Year => (1, 1, 0, 0, 0),
        Granularity::Month => (instant.month(), 1, 0, 0, 0),
        Granularity::Day => (instant.month(), instant.day(), 0, 0, 0),
        Granularity::Hour => (instant.month(), instant.day(), instant.hour(), 0, 0),
        Granularity::Minute => (
            instant.month(),
            instant.day(),
            instant.hour(),
            instant.minute(),
            0,
        ),
        Granularity::Second => (
            instant.month(),
            instant.day(),
            instant.hour(),
            instant.minute(),
            instant.second(),
        ),
    };
    Utc.with_ymd_and_hms(instant.year(), month, day, hour, minute, second)
        .single()
        .unwrap_or(instant)
}

/// Start of the bucket following the one starting at `instant`
pub fn step(instant: DateTime<Utc>, granularity: Granularity) -> Option<DateTime<Utc>> {
    match granularity {
        Granularity::None => None,
        Granularity::Year => instant.checked_add_months(Months::new(12)),
        Granularity::Month => instant.checked_add_months(Months::new(1)),
        Granularity::Day => instant.checked_add_signed(Duration::days(1)),
        Granularity::Hour => instant.checked_add_signed(Duration::hours(1)),
        Granularity::Minute => instant.checked_add_signed(Duration::minutes(1)),
        Granularity::Second => instant.checked_add_signed(Duration::seconds(1)),
    }
}

/// One representative instant per bucket covering `[start, end]`
///
/// Ascending and inclusive of the bucket holding `end`. For `None` the
/// range collapses to the single live bucket, represented by `end`.
pub fn expand(start: DateTime<Utc>, end: DateTime<Utc>, granularity: Granularity) -> Vec<DateTime<Utc>> {
    let end = normalize(end, granularity);
    if granularity.is_total() {
        return vec![end];
    }

    // Nudge past the boundary so a bucket starting exactly at `end` is kept
    let bound = end + Duration::milliseconds(1);
    let mut instants = Vec::new();
    let mut cursor = Some(normalize(start, granularity));
    while let Some(current) = cursor {
        if current >= bound {
            break;
        }
        instants.push(current);
        cursor = step(current, granularity);
    }
    instants
}

/// ISO 8601 key used in range results, e.g. `2015-01-01T00:00:00Z`
pub fn iso_key(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_datelike_parsing() {
        assert_eq!(DateLike::from("2014").to_instant().unwrap(), at(2014, 1, 1, 0, 0, 0));
        assert_eq!(DateLike::from("2014-05").to_instant().unwrap(), at(2014, 5, 1, 0, 0, 0));
        assert_eq!(
            DateLike::from("2014-05-06").to_instant().unwrap(),
            at(2014, 5, 6, 0, 0, 0)
        );
        assert_eq!(
            DateLike::from("2014-05-06T07:08:09Z").to_instant().unwrap(),
            at(2014, 5, 6, 7, 8, 9)
        );
        assert_eq!(
            DateLike::from("2014-05-06T09:08:09+02:00").to_instant().unwrap(),
            at(2014, 5, 6, 7, 8, 9)
        );
        assert_eq!(
            DateLike::from("2014-05-06 07:08:09").to_instant().unwrap(),
            at(2014, 5, 6, 7, 8, 9)
        );
        assert_eq!(
            DateLike::from(1_400_000_000_000i64).to_instant().unwrap(),
            DateTime::from_timestamp_millis(1_400_000_000_000).unwrap()
        );
    }

    #[test]
    fn test_datelike_rejects_garbage() {
        let err = DateLike::from("yesterday").to_instant().unwrap_err();
        assert!(matches!(err, MetricsError::InvalidArgument(_)));
    }

    #[test]
    fn test_range_requires_start() {
        let err = TimeRange::default().resolve(Utc::now()).unwrap_err();
        assert!(err.to_string().contains("startDate"));
    }

    #[test]
    fn test_range_end_defaults_to_now() {
        let now = at(2015, 6, 1, 0, 0, 0);
        let (start, end) = TimeRange::since("2015").resolve(now).unwrap();
        assert_eq!(start, at(2015, 1, 1, 0, 0, 0));
        assert_eq!(end, now);
    }

    #[test]
    fn test_normalize() {
        let t = at(2015, 3, 14, 9, 26, 53);
        assert_eq!(normalize(t, Granularity::None), t);
        assert_eq!(normalize(t, Granularity::Year), at(2015, 1, 1, 0, 0, 0));
        assert_eq!(normalize(t, Granularity::Month), at(2015, 3, 1, 0, 0, 0));
        assert_eq!(normalize(t, Granularity::Day), at(2015, 3, 14, 0, 0, 0));
        assert_eq!(normalize(t, Granularity::Hour), at(2015, 3, 14, 9, 0, 0));
        assert_eq!(normalize(t, Granularity::Minute), at(2015, 3, 14, 9, 26, 0));
        let with_millis = t + Duration::milliseconds(250);
        assert_eq!(normalize(with_millis, Granularity::Second), t);
    }

    #[test]
    fn test_expand_years_inclusive() {
        let instants = expand(at(2014, 1, 1, 0, 0, 0), at(2015, 1, 1, 0, 0, 0), Granularity::Year);
        assert_eq!(instants, vec![at(2014, 1, 1, 0, 0, 0), at(2015, 1, 1, 0, 0, 0)]);
    }

    #[test]
    fn test_expand_normalizes_unaligned_ends() {
        let instants = expand(at(2014, 3, 15, 8, 0, 0), at(2014, 5, 2, 0, 0, 0), Granularity::Month);
        assert_eq!(
            instants,
            vec![
                at(2014, 3, 1, 0, 0, 0),
                at(2014, 4, 1, 0, 0, 0),
                at(2014, 5, 1, 0, 0, 0)
            ]
        );
    }

    #[test]
    fn test_expand_month_end_does_not_drift() {
        // Jan 31 + 1 month must land on Feb 1, not Feb 28 / Mar 3
        let instants = expand(at(2015, 1, 31, 0, 0, 0), at(2015, 3, 1, 0, 0, 0), Granularity::Month);
        assert_eq!(instants.len(), 3);
        assert_eq!(instants[1], at(2015, 2, 1, 0, 0, 0));
    }

    #[test]
    fn test_expand_none_collapses_to_end() {
        let end = at(2015, 3, 14, 9, 26, 53);
        assert_eq!(expand(at(2010, 1, 1, 0, 0, 0), end, Granularity::None), vec![end]);
    }

    #[test]
    fn test_expand_counts() {
        let start = at(2015, 3, 14, 0, 0, 0);
        assert_eq!(expand(start, at(2015, 3, 15, 0, 0, 0), Granularity::Hour).len(), 25);
        assert_eq!(expand(start, at(2015, 3, 14, 0, 9, 59), Granularity::Minute).len(), 10);
        assert_eq!(expand(start, at(2015, 3, 14, 0, 0, 59), Granularity::Second).len(), 60);
        assert_eq!(expand(start, at(2016, 3, 14, 0, 0, 0), Granularity::Day).len(), 367);
    }

    #[test]
    fn test_expand_reversed_range_is_empty() {
        assert!(expand(at(2016, 1, 1, 0, 0, 0), at(2015, 1, 1, 0, 0, 0), Granularity::Year).is_empty());
    }

    #[test]
    fn test_iso_key() {
        assert_eq!(iso_key(at(2014, 1, 1, 0, 0, 0)), "2014-01-01T00:00:00Z");
    }
}
