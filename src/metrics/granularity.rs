//! Time granularity levels
//!
//! Counters bucket events at one of seven fixed levels, totally ordered by
//! specificity. Every level is addressable by its long name, a short code or
//! its ordinal. Unknown tokens resolve to [`Granularity::None`] instead of
//! failing, so a typo degrades to "total" rather than an error.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Bucket level, from grand total (`None`) to one bucket per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Granularity {
    /// Single bucket for the whole counter lifetime; also spelled `total`
    #[default]
    None = 0,
    Year = 1,
    Month = 2,
    Day = 3,
    Hour = 4,
    Minute = 5,
    Second = 6,
}

impl Granularity {
    /// All levels, least to most specific
    pub const ALL: [Granularity; 7] = [
        Granularity::None,
        Granularity::Year,
        Granularity::Month,
        Granularity::Day,
        Granularity::Hour,
        Granularity::Minute,
        Granularity::Second,
    ];

    /// Alias used when asking for the grand total
    pub const TOTAL: Granularity = Granularity::None;

    /// Resolve a token: long name, short code or numeric string
    ///
    /// Long names are case-insensitive. Short codes are case-sensitive only
    /// where they collide (`M` month, `m` minute).
    pub fn resolve(token: &str) -> Granularity {
        let token = token.trim();
        match token {
            "M" => return Granularity::Month,
            "m" => return Granularity::Minute,
            _ => {}
        }
        match token.to_ascii_lowercase().as_str() {
            "none" | "total" | "n" | "t" => Granularity::None,
            "year" | "y" => Granularity::Year,
            "month" => Granularity::Month,
            "day" | "d" => Granularity::Day,
            "hour" | "h" => Granularity::Hour,
            "minute" => Granularity::Minute,
            "second" | "s" => Granularity::Second,
            numeric => numeric
                .parse::<i64>()
                .map(Granularity::from_ordinal)
                .unwrap_or(Granularity::None),
        }
    }

    /// Level for an ordinal; out-of-range ordinals map to `None`
    pub fn from_ordinal(ordinal: i64) -> Granularity {
        match ordinal {
            1 => Granularity::Year,
            2 => Granularity::Month,
            3 => Granularity::Day,
            4 => Granularity::Hour,
            5 => Granularity::Minute,
            6 => Granularity::Second,
            _ => Granularity::None,
        }
    }

    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Long name (`none` for the total level)
    pub fn name(self) -> &'static str {
        match self {
            Granularity::None => "none",
            Granularity::Year => "year",
            Granularity::Month => "month",
            Granularity::Day => "day",
            Granularity::Hour => "hour",
            Granularity::Minute => "minute",
            Granularity::Second => "second",
        }
    }

    /// Width of this level's `YYYYMMDDhhmmss` timestamp prefix
    ///
    /// 0 for `None`, then 4, 6, 8, 10, 12, 14.
    pub fn timestamp_width(self) -> usize {
        match self {
            Granularity::None => 0,
            other => 2 * other.ordinal() + 2,
        }
    }

    /// Inverse of [`timestamp_width`](Self::timestamp_width)
    pub fn from_timestamp_width(width: usize) -> Option<Granularity> {
        match width {
            0 => Some(Granularity::None),
            4 | 6 | 8 | 10 | 12 | 14 => Some(Granularity::from_ordinal(((width - 2) / 2) as i64)),
            _ => None,
        }
    }

    /// Whether this is the single-bucket level
    pub fn is_total(self) -> bool {
        self == Granularity::None
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Granularity {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Granularity::resolve(s))
    }
}

impl From<&str> for Granularity {
    fn from(token: &str) -> Self {
        Granularity::resolve(token)
    }
}

impl From<i64> for Granularity {
    fn from(ordinal: i64) -> Self {
        Granularity::from_ordinal(ordinal)
    }
}

impl Serialize for Granularity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Token {
            Name(String),
            Ordinal(i64),
        }

        Ok(match Token::deserialize(deserializer)? {
            Token::Name(name) => Granularity::resolve(&name),
            Token::Ordinal(ordinal) => Granularity::from_ordinal(ordinal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_names() {
        assert_eq!(Granularity::resolve("year"), Granularity::Year);
        assert_eq!(Granularity::resolve("Month"), Granularity::Month);
        assert_eq!(Granularity::resolve("SECOND"), Granularity::Second);
    }

    #[test]
    fn test_none_and_total_are_synonyms() {
        assert_eq!(Granularity::resolve("none"), Granularity::None);
        assert_eq!(Granularity::resolve("total"), Granularity::None);
        assert_eq!(Granularity::TOTAL, Granularity::None);
    }

    #[test]
    fn test_short_codes() {
        assert_eq!(Granularity::resolve("Y"), Granularity::Year);
        assert_eq!(Granularity::resolve("M"), Granularity::Month);
        assert_eq!(Granularity::resolve("m"), Granularity::Minute);
        assert_eq!(Granularity::resolve("d"), Granularity::Day);
        assert_eq!(Granularity::resolve("H"), Granularity::Hour);
        assert_eq!(Granularity::resolve("s"), Granularity::Second);
    }

    #[test]
    fn test_numeric_tokens() {
        assert_eq!(Granularity::resolve("3"), Granularity::Day);
        assert_eq!(Granularity::from(6), Granularity::Second);
        assert_eq!(Granularity::from_ordinal(0), Granularity::None);
    }

    #[test]
    fn test_unknown_tokens_fall_back_to_none() {
        assert_eq!(Granularity::resolve("fortnight"), Granularity::None);
        assert_eq!(Granularity::resolve("7"), Granularity::None);
        assert_eq!(Granularity::resolve("-1"), Granularity::None);
        assert_eq!(Granularity::resolve(""), Granularity::None);
    }

    #[test]
    fn test_ordering() {
        for pair in Granularity::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].ordinal() + 1, pair[1].ordinal());
        }
    }

    #[test]
    fn test_timestamp_width_roundtrip() {
        for g in Granularity::ALL {
            assert_eq!(Granularity::from_timestamp_width(g.timestamp_width()), Some(g));
        }
        assert_eq!(Granularity::from_timestamp_width(5), None);
    }

    #[test]
    fn test_serde_accepts_names_and_ordinals() {
        let g: Granularity = serde_json::from_str("\"hour\"").unwrap();
        assert_eq!(g, Granularity::Hour);
        let g: Granularity = serde_json::from_str("2").unwrap();
        assert_eq!(g, Granularity::Month);
        assert_eq!(serde_json::to_string(&Granularity::Day).unwrap(), "\"day\"");
    }
}
