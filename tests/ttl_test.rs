//! Key Expiry Tests
//!
//! Buckets get their TTL when they are created and never again. Time is
//! driven by a simulated clock shared with the in-memory store.

use chrono::{TimeZone, Utc};
use redis_tally::metrics::{
    CountOptions, CounterOptions, ExpirationTable, Granularity, Metrics, TimeRange,
};
use redis_tally::store::{SimulatedClock, Store, StoreCommand, StoreReply};
use std::sync::Arc;
use std::time::Duration;

fn clock() -> SimulatedClock {
    SimulatedClock::at(Utc.with_ymd_and_hms(2015, 3, 14, 9, 0, 0).unwrap())
}

async fn pttl<S: Store>(store: &S, key: &str) -> i64 {
    match store
        .execute(StoreCommand::Pttl { key: key.to_string() })
        .await
        .unwrap()
    {
        StoreReply::Integer(ms) => ms,
        other => panic!("unexpected PTTL reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_ttl_not_renewed_by_later_increments() {
    let clock = clock();
    let metrics = Metrics::in_memory(Arc::new(clock.clone()));
    let c = metrics.counter(
        "foo",
        CounterOptions::new()
            .time_granularity(Granularity::Day)
            .expiration(ExpirationTable::new().with(Granularity::Day, 100)),
    );

    c.incr().await.unwrap();
    let first = pttl(metrics.store().as_ref(), "c:foo:20150314").await;
    assert_eq!(first, 100_000);

    clock.advance(Duration::from_millis(1100));
    c.incr().await.unwrap();
    let second = pttl(metrics.store().as_ref(), "c:foo:20150314").await;
    assert!(second < first, "ttl was refreshed: {} >= {}", second, first);
    assert_eq!(second, 98_900);
}

#[tokio::test]
async fn test_ranked_ttl_not_renewed_by_new_member() {
    let clock = clock();
    let metrics = Metrics::in_memory(Arc::new(clock.clone()));
    let c = metrics.counter(
        "foo",
        CounterOptions::new()
            .time_granularity(Granularity::Day)
            .expiration(ExpirationTable::new().with(Granularity::Day, 100)),
    );

    c.increment(1, Some("A")).await.unwrap();
    clock.advance(Duration::from_secs(10));
    // First write of "B" must not restart the set's clock
    c.increment(1, Some("B")).await.unwrap();
    assert_eq!(pttl(metrics.store().as_ref(), "c:foo:20150314:z").await, 90_000);
}

#[tokio::test]
async fn test_defaults_and_persistent_levels() {
    let clock = clock();
    let metrics = Metrics::in_memory(Arc::new(clock.clone()));
    let c = metrics.counter("foo", CounterOptions::new().time_granularity(Granularity::Second));
    c.incr().await.unwrap();

    let store = metrics.store().as_ref();
    assert_eq!(pttl(store, "c:foo").await, -1);
    assert_eq!(pttl(store, "c:foo:2015").await, -1);
    assert_eq!(pttl(store, "c:foo:201503").await, 10 * 365 * 24 * 3600 * 1000);
    assert_eq!(pttl(store, "c:foo:2015031409").await, 31 * 24 * 3600 * 1000);
    assert_eq!(pttl(store, "c:foo:20150314090000").await, 600 * 1000);
    assert_eq!(pttl(store, "c:foo:nothing").await, -2);
}

#[tokio::test]
async fn test_expired_bucket_reads_zero() {
    let clock = clock();
    let metrics = Metrics::in_memory(Arc::new(clock.clone()));
    let c = metrics.counter("foo", CounterOptions::new().time_granularity(Granularity::Second));
    c.increment(5, None).await.unwrap();

    // Same hour, past the second bucket's ten-minute TTL
    clock.advance(Duration::from_secs(601));
    let range = TimeRange::between("2015-03-14T09:00:00Z", "2015-03-14T09:00:00Z");
    let result = c.count_range("second", &range, None).await.unwrap();
    assert_eq!(result.total(), 0);
    assert_eq!(c.count(CountOptions::new()).await.unwrap(), 5);
    assert_eq!(c.count(CountOptions::new().granularity("hour")).await.unwrap(), 5);
}

#[tokio::test]
async fn test_expire_keys_disabled() {
    let clock = clock();
    let metrics = Metrics::in_memory(Arc::new(clock.clone()));
    let c = metrics.counter(
        "foo",
        CounterOptions::new()
            .time_granularity(Granularity::Second)
            .expire_keys(false),
    );
    c.incr().await.unwrap();
    assert_eq!(pttl(metrics.store().as_ref(), "c:foo:20150314090000").await, -1);
}
