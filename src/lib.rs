pub mod config;
pub mod metrics;
pub mod observability;
pub mod store;

pub use config::MetricsConfig;
pub use metrics::{
    CountOptions, Counter, CounterOptions, Direction, Granularity, Metrics, MetricsError,
    RangeCount, RangeTop, RankEntry, TimeRange, TopOptions, TrimOptions,
};
pub use store::{Clock, MemoryStore, SimulatedClock, Store, StoreError, SystemClock};
#[cfg(feature = "redis")]
pub use store::RedisStore;
