//! Redis-backed store
//!
//! Single commands go straight over a multiplexed connection; batches run as
//! a MULTI/EXEC pipeline. The expire-on-create increments are Lua scripts so
//! the existence check, the increment and the EXPIRE happen atomically.

use super::{Store, StoreCommand, StoreError, StoreFuture, StoreReply, StoreResult};
use redis::aio::MultiplexedConnection;
use redis::{Cmd, Pipeline, Value};
use tracing::debug;

/// KEYS[1] = key, ARGV[1] = amount, ARGV[2] = ttl seconds
const INCRBY_EXPIRE_ON_CREATE: &str = r#"
local created = redis.call('EXISTS', KEYS[1]) == 0
local value = redis.call('INCRBY', KEYS[1], ARGV[1])
if created then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return value
"#;

/// KEYS[1] = key, ARGV[1] = amount, ARGV[2] = member, ARGV[3] = ttl seconds
const ZINCRBY_EXPIRE_ON_CREATE: &str = r#"
local created = redis.call('EXISTS', KEYS[1]) == 0
local score = redis.call('ZINCRBY', KEYS[1], ARGV[1], ARGV[2])
if created then
  redis.call('EXPIRE', KEYS[1], ARGV[3])
end
return score
"#;

/// [`Store`] talking to a Redis server
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("connected to redis");
        Ok(RedisStore { conn })
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        RedisStore { conn }
    }

    fn to_cmd(cmd: &StoreCommand) -> Cmd {
        match cmd {
            StoreCommand::Get { key } => {
                let mut c = redis::cmd("GET");
                c.arg(key);
                c
            }
            StoreCommand::MGet { keys } => {
                let mut c = redis::cmd("MGET");
                c.arg(keys);
                c
            }
            StoreCommand::IncrBy {
                key,
                amount,
                ttl_secs: None,
            } => {
                let mut c = redis::cmd("INCRBY");
                c.arg(key).arg(*amount);
                c
            }
            StoreCommand::IncrBy {
                key,
                amount,
                ttl_secs: Some(ttl),
            } => {
                let mut c = redis::cmd("EVAL");
                c.arg(INCRBY_EXPIRE_ON_CREATE)
                    .arg(1)
                    .arg(key)
                    .arg(*amount)
                    .arg(*ttl);
                c
            }
            StoreCommand::ZIncrBy {
                key,
                member,
                amount,
                ttl_secs: None,
            } => {
                let mut c = redis::cmd("ZINCRBY");
                c.arg(key).arg(*amount).arg(member);
                c
            }
            StoreCommand::ZIncrBy {
                key,
                member,
                amount,
                ttl_secs: Some(ttl),
            } => {
                let mut c = redis::cmd("EVAL");
                c.arg(ZINCRBY_EXPIRE_ON_CREATE)
                    .arg(1)
                    .arg(key)
                    .arg(*amount)
                    .arg(member)
                    .arg(*ttl);
                c
            }
            StoreCommand::ZScore { key, member } => {
                let mut c = redis::cmd("ZSCORE");
                c.arg(key).arg(member);
                c
            }
            StoreCommand::ZRange {
                key,
                start,
                stop,
                rev,
            } => {
                let mut c = redis::cmd(if *rev { "ZREVRANGE" } else { "ZRANGE" });
                c.arg(key).arg(*start).arg(*stop).arg("WITHSCORES");
                c
            }
            StoreCommand::ZRemRangeByRank { key, start, stop } => {
                let mut c = redis::cmd("ZREMRANGEBYRANK");
                c.arg(key).arg(*start).arg(*stop);
                c
            }
            StoreCommand::ZRem { key, member } => {
                let mut c = redis::cmd("ZREM");
                c.arg(key).arg(member);
                c
            }
            StoreCommand::Del { key } => {
                let mut c = redis::cmd("DEL");
                c.arg(key);
                c
            }
            StoreCommand::Pttl { key } => {
                let mut c = redis::cmd("PTTL");
                c.arg(key);
                c
            }
        }
    }
}

/// Flatten a client value into the store's reply shape
fn to_reply(value: Value) -> StoreResult<StoreReply> {
    match value {
        Value::Nil => Ok(StoreReply::Nil),
        Value::Int(n) => Ok(StoreReply::Integer(n)),
        Value::BulkString(bytes) => Ok(StoreReply::Bulk(
            String::from_utf8_lossy(&bytes).into_owned(),
        )),
        Value::SimpleString(s) => Ok(StoreReply::Bulk(s)),
        Value::Okay => Ok(StoreReply::Bulk("OK".to_string())),
        Value::Double(d) => Ok(StoreReply::Bulk(d.to_string())),
        Value::Array(items) | Value::Set(items) => Ok(StoreReply::Array(
            items
                .into_iter()
                .map(to_reply)
                .collect::<StoreResult<Vec<_>>>()?,
        )),
        other => Err(StoreError::UnexpectedReply(format!("{:?}", other))),
    }
}

impl Store for RedisStore {
    fn execute(&self, cmd: StoreCommand) -> StoreFuture<'_, StoreReply> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Value = Self::to_cmd(&cmd).query_async(&mut conn).await?;
            to_reply(value)
        })
    }

    fn execute_batch(&self, cmds: Vec<StoreCommand>) -> StoreFuture<'_, Vec<StoreReply>> {
        Box::pin(async move {
            if cmds.is_empty() {
                return Ok(Vec::new());
            }
            let mut pipe = Pipeline::with_capacity(cmds.len());
            pipe.atomic();
            for cmd in &cmds {
                pipe.add_command(Self::to_cmd(cmd));
            }
            let mut conn = self.conn.clone();
            let values: Vec<Value> = pipe.query_async(&mut conn).await?;
            values.into_iter().map(to_reply).collect()
        })
    }
}
