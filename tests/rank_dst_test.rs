//! Ranking Deterministic Simulation Tests
//!
//! Seeded random workloads compared against a naive model:
//! - Merging per-bucket rankings sums before sorting and slicing
//! - Counter rankings over a range match the increments that produced them

use chrono::{Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use redis_tally::metrics::{
    parse_rank_total, CounterOptions, Direction, Granularity, Metrics, RankEntry, TimeRange,
    TopOptions,
};
use redis_tally::store::{SimulatedClock, StoreReply};
use std::collections::BTreeMap;
use std::sync::Arc;

const MEMBERS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

fn random_bucket(rng: &mut ChaCha8Rng) -> Vec<(String, i64)> {
    let mut bucket = Vec::new();
    for member in MEMBERS {
        if rng.gen_bool(0.6) {
            bucket.push((member.to_string(), rng.gen_range(1..50i64)));
        }
    }
    bucket.sort_by(|a, b| b.1.cmp(&a.1));
    bucket
}

fn as_reply(bucket: &[(String, i64)]) -> StoreReply {
    StoreReply::Array(
        bucket
            .iter()
            .flat_map(|(m, s)| [StoreReply::Bulk(m.clone()), StoreReply::Bulk(s.to_string())])
            .collect(),
    )
}

/// Quadratic reference: linear lookup, insertion in first-seen order
fn model(buckets: &[Vec<(String, i64)>], direction: Direction, skip: usize, limit: i64) -> Vec<RankEntry> {
    let mut merged: Vec<(String, i64)> = Vec::new();
    for (member, score) in buckets.iter().flatten() {
        match merged.iter_mut().find(|(m, _)| m == member) {
            Some(entry) => entry.1 += score,
            None => merged.push((member.clone(), *score)),
        }
    }
    if direction == Direction::Desc {
        merged.sort_by_key(|(_, s)| std::cmp::Reverse(*s));
    } else {
        merged.sort_by_key(|(_, s)| *s);
    }
    let n = if limit > 0 { limit as usize } else { usize::MAX };
    merged
        .into_iter()
        .skip(skip)
        .take(n)
        .map(|(m, s)| RankEntry::new(m, s))
        .collect()
}

#[test]
fn test_rank_total_matches_model_100_seeds() {
    for seed in 0..100 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let buckets: Vec<_> = (0..rng.gen_range(0..12)).map(|_| random_bucket(&mut rng)).collect();
        let replies: Vec<StoreReply> = buckets.iter().map(|b| as_reply(b)).collect();

        let direction = if rng.gen_bool(0.5) { Direction::Desc } else { Direction::Asc };
        let skip = rng.gen_range(0..4);
        let limit = rng.gen_range(-1..6);

        assert_eq!(
            parse_rank_total(&replies, direction, skip, limit),
            model(&buckets, direction, skip, limit),
            "seed {} direction {} skip {} limit {}",
            seed,
            direction,
            skip,
            limit
        );
    }
}

#[tokio::test]
async fn test_top_range_matches_increments_50_seeds() {
    let origin = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();

    for seed in 0..50 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let clock = SimulatedClock::at(origin);
        let metrics = Metrics::in_memory(Arc::new(clock.clone()));
        let c = metrics.counter("views", CounterOptions::new().time_granularity(Granularity::Day));

        let mut expected: BTreeMap<String, i64> = BTreeMap::new();
        let mut per_day: BTreeMap<i64, i64> = BTreeMap::new();
        for _ in 0..rng.gen_range(1..60) {
            let day = rng.gen_range(0..20);
            let member = MEMBERS[rng.gen_range(0..MEMBERS.len())];
            let amount = rng.gen_range(1..10);
            clock.set(origin + Duration::days(day) + Duration::minutes(rng.gen_range(0..1440)));
            c.increment(amount, Some(member)).await.unwrap();
            *expected.entry(member.to_string()).or_default() += amount;
            *per_day.entry(day).or_default() += amount;
        }

        let range = TimeRange::between("2015-01-01", "2015-01-20");
        let merged = c.top_range(&range, TopOptions::new()).await.unwrap();
        let merged = merged.as_total().unwrap();

        assert!(
            merged.windows(2).all(|w| w[0].score >= w[1].score),
            "seed {}: not descending",
            seed
        );
        let actual: BTreeMap<String, i64> =
            merged.iter().map(|e| (e.member.clone(), e.score)).collect();
        assert_eq!(actual, expected, "seed {}", seed);

        let series = c
            .top_range(&range, TopOptions::new().granularity("day"))
            .await
            .unwrap();
        let series = series.as_series().unwrap();
        assert_eq!(series.len(), 20, "seed {}", seed);
        for (day, total) in &per_day {
            let key = (origin + Duration::days(*day)).format("%Y-%m-%dT%H:%M:%SZ").to_string();
            let sum: i64 = series[&key].iter().map(|e| e.score).sum();
            assert_eq!(sum, *total, "seed {} day {}", seed, key);
        }
    }
}
