//! Store reply parsers
//!
//! Pure functions turning raw replies into counter results. None of them
//! fail: missing or malformed scalars read as zero.

use super::types::{Direction, RankEntry};
use crate::store::StoreReply;
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Coerce a scalar reply to an integer; nil or non-numeric reads as 0
pub fn parse_int(reply: &StoreReply) -> i64 {
    match reply {
        StoreReply::Integer(n) => *n,
        StoreReply::Bulk(s) => parse_score(s),
        StoreReply::Nil | StoreReply::Array(_) => 0,
    }
}

/// Scores come back as `"5"` or, from some servers, `"5.0"` / `"5e3"`
fn parse_score(s: &str) -> i64 {
    let s = s.trim();
    s.parse::<i64>().unwrap_or_else(|_| {
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f as i64)
            .unwrap_or(0)
    })
}

/// Zip representative timestamps with per-bucket scalar replies
pub fn parse_range_map(timestamps: &[String], replies: &[StoreReply]) -> BTreeMap<String, i64> {
    timestamps
        .iter()
        .zip(replies)
        .map(|(ts, reply)| (ts.clone(), parse_int(reply)))
        .collect()
}

/// Sum per-bucket scalar replies
pub fn parse_range_total(replies: &[StoreReply]) -> i64 {
    replies.iter().map(parse_int).sum()
}

/// Turn a WITHSCORES reply into ranked entries, keeping the reply order
///
/// Accepts the flat `[member, score, member, score, ...]` form as well as
/// `[[member, score], ...]` pairs.
pub fn parse_rank(reply: &StoreReply) -> Vec<RankEntry> {
    let items = match reply {
        StoreReply::Array(items) => items,
        _ => return Vec::new(),
    };

    if items.iter().all(|item| matches!(item, StoreReply::Array(_))) {
        return items
            .iter()
            .filter_map(|pair| match pair {
                StoreReply::Array(pair) if pair.len() == 2 => {
                    Some(RankEntry::new(member_of(&pair[0]), parse_int(&pair[1])))
                }
                _ => None,
            })
            .collect();
    }

    items
        .chunks_exact(2)
        .map(|pair| RankEntry::new(member_of(&pair[0]), parse_int(&pair[1])))
        .collect()
}

fn member_of(reply: &StoreReply) -> String {
    match reply {
        StoreReply::Bulk(s) => s.clone(),
        StoreReply::Integer(n) => n.to_string(),
        StoreReply::Nil | StoreReply::Array(_) => String::new(),
    }
}

/// Zip representative timestamps with per-bucket rank replies
pub fn parse_rank_range(
    timestamps: &[String],
    replies: &[StoreReply],
) -> BTreeMap<String, Vec<RankEntry>> {
    timestamps
        .iter()
        .zip(replies)
        .map(|(ts, reply)| (ts.clone(), parse_rank(reply)))
        .collect()
}

/// Merge unsliced per-bucket rankings into one ranking over the whole range
///
/// Scores are summed per member across buckets before sorting, so a member
/// that is mid-table in every bucket can still top the merged list. The
/// sort is stable: ties keep first-seen order. `starting_at` entries are
/// skipped, then at most `limit` returned (`limit <= 0` is unlimited).
pub fn parse_rank_total(
    replies: &[StoreReply],
    direction: Direction,
    starting_at: usize,
    limit: i64,
) -> Vec<RankEntry> {
    let mut merged: Vec<RankEntry> = Vec::new();
    let mut index: AHashMap<String, usize> = AHashMap::new();

    for entry in replies.iter().flat_map(parse_rank) {
        match index.get(&entry.member) {
            Some(&i) => merged[i].score += entry.score,
            None => {
                index.insert(entry.member.clone(), merged.len());
                merged.push(entry);
            }
        }
    }

    match direction {
        Direction::Desc => merged.sort_by(|a, b| b.score.cmp(&a.score)),
        Direction::Asc => merged.sort_by(|a, b| a.score.cmp(&b.score)),
    }

    let ranked = merged.into_iter().skip(starting_at);
    if limit > 0 {
        ranked.take(limit as usize).collect()
    } else {
        ranked.collect()
    }
}
