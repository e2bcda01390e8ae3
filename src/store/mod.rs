//! Store Abstraction
//!
//! The counter engine never talks to Redis directly. It builds
//! [`StoreCommand`] values and hands them to a [`Store`], either one at a
//! time or as an atomic batch.
//!
//! Implementations:
//! - `MemoryStore`: In-process keyspace for tests and embedded use
//! - `RedisStore`: Real Redis over a multiplexed connection (feature `redis`)

mod clock;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod sorted_set;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use sorted_set::SortedSet;

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`Store`] methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key holds a value of a different kind
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// Stored string is not an integer
    #[error("ERR value is not an integer or out of range")]
    NotInteger,
    /// Reply shape did not match the command
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    /// Fault injected by a test harness
    #[error("injected failure on command #{0}")]
    Injected(usize),
    /// Error reported by the Redis client
    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] ::redis::RedisError),
}

/// A single store command
///
/// The `ttl_secs` variants of the increments are the atomic
/// "increment; if this write created the key, expire it" primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    /// GET key
    Get { key: String },
    /// MGET key [key ...]
    MGet { keys: Vec<String> },
    /// INCRBY key amount, expiring a freshly created key
    IncrBy {
        key: String,
        amount: i64,
        ttl_secs: Option<u64>,
    },
    /// ZINCRBY key amount member, expiring a freshly created key
    ZIncrBy {
        key: String,
        member: String,
        amount: i64,
        ttl_secs: Option<u64>,
    },
    /// ZSCORE key member
    ZScore { key: String, member: String },
    /// ZRANGE / ZREVRANGE key start stop WITHSCORES
    ZRange {
        key: String,
        start: i64,
        stop: i64,
        rev: bool,
    },
    /// ZREMRANGEBYRANK key start stop
    ZRemRangeByRank { key: String, start: i64, stop: i64 },
    /// ZREM key member
    ZRem { key: String, member: String },
    /// DEL key
    Del { key: String },
    /// PTTL key
    Pttl { key: String },
}

impl StoreCommand {
    /// Command name as Redis spells it
    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::Get { .. } => "GET",
            StoreCommand::MGet { .. } => "MGET",
            StoreCommand::IncrBy { .. } => "INCRBY",
            StoreCommand::ZIncrBy { .. } => "ZINCRBY",
            StoreCommand::ZScore { .. } => "ZSCORE",
            StoreCommand::ZRange { rev: false, .. } => "ZRANGE",
            StoreCommand::ZRange { rev: true, .. } => "ZREVRANGE",
            StoreCommand::ZRemRangeByRank { .. } => "ZREMRANGEBYRANK",
            StoreCommand::ZRem { .. } => "ZREM",
            StoreCommand::Del { .. } => "DEL",
            StoreCommand::Pttl { .. } => "PTTL",
        }
    }
}

/// Reply to a store command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreReply {
    Nil,
    Integer(i64),
    Bulk(String),
    Array(Vec<StoreReply>),
}

impl StoreReply {
    /// Unwrap an array reply
    pub fn into_array(self) -> StoreResult<Vec<StoreReply>> {
        match self {
            StoreReply::Array(items) => Ok(items),
            StoreReply::Nil => Ok(Vec::new()),
            other => Err(StoreError::UnexpectedReply(format!(
                "expected array, got {:?}",
                other
            ))),
        }
    }

    /// Unwrap an integer reply
    pub fn into_integer(self) -> StoreResult<i64> {
        match self {
            StoreReply::Integer(n) => Ok(n),
            other => Err(StoreError::UnexpectedReply(format!(
                "expected integer, got {:?}",
                other
            ))),
        }
    }
}

/// Store command surface consumed by counters
///
/// Follows the boxed-future style so that `Arc<dyn Store>` works.
pub trait Store: Send + Sync + 'static {
    /// Execute a single command
    fn execute(&self, cmd: StoreCommand) -> StoreFuture<'_, StoreReply>;

    /// Execute commands as one atomic unit, returning one reply per command
    ///
    /// Either every command applies or none does.
    fn execute_batch(&self, cmds: Vec<StoreCommand>) -> StoreFuture<'_, Vec<StoreReply>>;
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn execute(&self, cmd: StoreCommand) -> StoreFuture<'_, StoreReply> {
        (**self).execute(cmd)
    }

    fn execute_batch(&self, cmds: Vec<StoreCommand>) -> StoreFuture<'_, Vec<StoreReply>> {
        (**self).execute_batch(cmds)
    }
}
