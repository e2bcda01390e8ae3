//! In-memory store
//!
//! A small Redis-compatible keyspace covering exactly the command surface
//! counters use: integer strings, sorted sets and per-key expiry. Expired
//! keys are evicted lazily on access, measured against the store's
//! [`Clock`].

use super::clock::{Clock, SystemClock};
use super::sorted_set::SortedSet;
use super::{Store, StoreCommand, StoreError, StoreFuture, StoreReply, StoreResult};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum StoredValue {
    Integer(i64),
    SortedSet(SortedSet),
}

/// A key's value and absolute expiry before a batch first touched it
type Saved = (Option<StoredValue>, Option<i64>);

#[derive(Debug, Default)]
struct Keyspace {
    data: AHashMap<String, StoredValue>,
    /// Absolute expiry per key, Unix milliseconds
    expirations: AHashMap<String, i64>,
    commands_processed: usize,
    fail_after: Option<usize>,
}

impl Keyspace {
    fn evict_if_expired(&mut self, key: &str, now_ms: i64) {
        if let Some(expires_at) = self.expirations.get(key) {
            if *expires_at <= now_ms {
                self.data.remove(key);
                self.expirations.remove(key);
            }
        }
    }

    fn expire_if_created(&mut self, key: &str, created: bool, ttl_secs: Option<u64>, now_ms: i64) {
        if let (true, Some(ttl)) = (created, ttl_secs) {
            let ttl_ms = i64::try_from(ttl).unwrap_or(i64::MAX).saturating_mul(1000);
            self.expirations
                .insert(key.to_string(), now_ms.saturating_add(ttl_ms));
        }
    }

    fn save(&self, key: &str) -> Saved {
        (self.data.get(key).cloned(), self.expirations.get(key).copied())
    }

    fn restore(&mut self, key: String, (value, expires_at): Saved) {
        match expires_at {
            Some(at) => self.expirations.insert(key.clone(), at),
            None => self.expirations.remove(&key),
        };
        match value {
            Some(value) => self.data.insert(key, value),
            None => self.data.remove(&key),
        };
    }

    fn apply(&mut self, cmd: &StoreCommand, now_ms: i64) -> StoreResult<StoreReply> {
        let seq = self.commands_processed;
        self.commands_processed += 1;
        if matches!(self.fail_after, Some(limit) if seq >= limit) {
            return Err(StoreError::Injected(seq));
        }

        match cmd {
            StoreCommand::Get { key } => {
                self.evict_if_expired(key, now_ms);
                self.get(key)
            }
            StoreCommand::MGet { keys } => {
                let mut replies = Vec::with_capacity(keys.len());
                for key in keys {
                    self.evict_if_expired(key, now_ms);
                    // MGET reports nil for keys of another type
                    replies.push(self.get(key).unwrap_or(StoreReply::Nil));
                }
                Ok(StoreReply::Array(replies))
            }
            StoreCommand::IncrBy {
                key,
                amount,
                ttl_secs,
            } => {
                self.evict_if_expired(key, now_ms);
                let created = !self.data.contains_key(key);
                let value = match self
                    .data
                    .entry(key.clone())
                    .or_insert(StoredValue::Integer(0))
                {
                    StoredValue::Integer(n) => {
                        *n = n.checked_add(*amount).ok_or(StoreError::NotInteger)?;
                        *n
                    }
                    StoredValue::SortedSet(_) => return Err(StoreError::WrongType),
                };
                self.expire_if_created(key, created, *ttl_secs, now_ms);
                Ok(StoreReply::Integer(value))
            }
            StoreCommand::ZIncrBy {
                key,
                member,
                amount,
                ttl_secs,
            } => {
                self.evict_if_expired(key, now_ms);
                let created = !self.data.contains_key(key);
                let score = match self
                    .data
                    .entry(key.clone())
                    .or_insert_with(|| StoredValue::SortedSet(SortedSet::new()))
                {
                    StoredValue::SortedSet(zs) => zs.incr_by(member, *amount),
                    StoredValue::Integer(_) => return Err(StoreError::WrongType),
                };
                self.expire_if_created(key, created, *ttl_secs, now_ms);
                Ok(StoreReply::Bulk(score.to_string()))
            }
            StoreCommand::ZScore { key, member } => {
                self.evict_if_expired(key, now_ms);
                match self.data.get(key) {
                    Some(StoredValue::SortedSet(zs)) => Ok(zs
                        .score(member)
                        .map(|s| StoreReply::Bulk(s.to_string()))
                        .unwrap_or(StoreReply::Nil)),
                    Some(StoredValue::Integer(_)) => Err(StoreError::WrongType),
                    None => Ok(StoreReply::Nil),
                }
            }
            StoreCommand::ZRange {
                key,
                start,
                stop,
                rev,
            } => {
                self.evict_if_expired(key, now_ms);
                match self.data.get(key) {
                    Some(StoredValue::SortedSet(zs)) => {
                        let entries = if *rev {
                            zs.rev_range(*start, *stop)
                        } else {
                            zs.range(*start, *stop)
                        };
                        let flat = entries
                            .into_iter()
                            .flat_map(|(member, score)| {
                                [StoreReply::Bulk(member), StoreReply::Bulk(score.to_string())]
                            })
                            .collect();
                        Ok(StoreReply::Array(flat))
                    }
                    Some(StoredValue::Integer(_)) => Err(StoreError::WrongType),
                    None => Ok(StoreReply::Array(Vec::new())),
                }
            }
            StoreCommand::ZRemRangeByRank { key, start, stop } => {
                self.evict_if_expired(key, now_ms);
                let removed = match self.data.get_mut(key) {
                    Some(StoredValue::SortedSet(zs)) => zs.remove_range_by_rank(*start, *stop),
                    Some(StoredValue::Integer(_)) => return Err(StoreError::WrongType),
                    None => 0,
                };
                self.drop_if_empty(key);
                Ok(StoreReply::Integer(removed as i64))
            }
            StoreCommand::ZRem { key, member } => {
                self.evict_if_expired(key, now_ms);
                let removed = match self.data.get_mut(key) {
                    Some(StoredValue::SortedSet(zs)) => zs.remove(member),
                    Some(StoredValue::Integer(_)) => return Err(StoreError::WrongType),
                    None => false,
                };
                self.drop_if_empty(key);
                Ok(StoreReply::Integer(removed as i64))
            }
            StoreCommand::Del { key } => {
                self.evict_if_expired(key, now_ms);
                self.expirations.remove(key);
                let removed = self.data.remove(key).is_some();
                debug_assert!(
                    !self.data.contains_key(key),
                    "Postcondition violated: DEL must remove key"
                );
                Ok(StoreReply::Integer(removed as i64))
            }
            StoreCommand::Pttl { key } => {
                self.evict_if_expired(key, now_ms);
                let result = if !self.data.contains_key(key) {
                    -2 // Key does not exist
                } else if let Some(expires_at) = self.expirations.get(key) {
                    (expires_at - now_ms).max(0)
                } else {
                    -1 // Key exists but has no associated expire
                };
                Ok(StoreReply::Integer(result))
            }
        }
    }

    fn get(&self, key: &str) -> StoreResult<StoreReply> {
        match self.data.get(key) {
            Some(StoredValue::Integer(n)) => Ok(StoreReply::Bulk(n.to_string())),
            Some(StoredValue::SortedSet(_)) => Err(StoreError::WrongType),
            None => Ok(StoreReply::Nil),
        }
    }

    /// Redis deletes a sorted set once its last member is gone
    fn drop_if_empty(&mut self, key: &str) {
        if matches!(self.data.get(key), Some(StoredValue::SortedSet(zs)) if zs.is_empty()) {
            self.data.remove(key);
            self.expirations.remove(key);
        }
    }
}

/// In-memory [`Store`] backed by a mutex-guarded keyspace
///
/// Clones share the same keyspace.
#[derive(Clone)]
pub struct MemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store measuring expiry against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            keyspace: Arc::new(Mutex::new(Keyspace::default())),
            clock,
        }
    }

    /// Number of live keys (for testing)
    pub fn len(&self) -> usize {
        let now_ms = self.clock.now_millis();
        let keyspace = self.keyspace.lock();
        keyspace
            .data
            .keys()
            .filter(|key| {
                keyspace
                    .expirations
                    .get(*key)
                    .map_or(true, |expires_at| *expires_at > now_ms)
            })
            .count()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every command from the `n`-th onward (counting from zero
    /// across the store's lifetime) fail with [`StoreError::Injected`]
    pub fn fail_after(&self, n: usize) {
        let mut keyspace = self.keyspace.lock();
        keyspace.fail_after = Some(keyspace.commands_processed + n);
    }

    /// Clear any injected failure
    pub fn heal(&self) {
        self.keyspace.lock().fail_after = None;
    }

    /// Total commands processed so far, including failed ones
    pub fn commands_processed(&self) -> usize {
        self.keyspace.lock().commands_processed
    }
}

impl Store for MemoryStore {
    fn execute(&self, cmd: StoreCommand) -> StoreFuture<'_, StoreReply> {
        Box::pin(async move {
            let now_ms = self.clock.now_millis();
            self.keyspace.lock().apply(&cmd, now_ms)
        })
    }

    fn execute_batch(&self, cmds: Vec<StoreCommand>) -> StoreFuture<'_, Vec<StoreReply>> {
        Box::pin(async move {
            let now_ms = self.clock.now_millis();
            let mut keyspace = self.keyspace.lock();

            // Remember each touched key once so a failing command can be undone
            let mut undo: AHashMap<String, Saved> = AHashMap::new();
            let mut replies = Vec::with_capacity(cmds.len());
            for cmd in &cmds {
                for key in touched_keys(cmd) {
                    if !undo.contains_key(key) {
                        undo.insert(key.to_string(), keyspace.save(key));
                    }
                }
                match keyspace.apply(cmd, now_ms) {
                    Ok(reply) => replies.push(reply),
                    Err(e) => {
                        for (key, saved) in undo {
                            keyspace.restore(key, saved);
                        }
                        return Err(e);
                    }
                }
            }
            Ok(replies)
        })
    }
}

fn touched_keys(cmd: &StoreCommand) -> Vec<&str> {
    match cmd {
        StoreCommand::MGet { keys } => keys.iter().map(String::as_str).collect(),
        StoreCommand::Get { key }
        | StoreCommand::IncrBy { key, .. }
        | StoreCommand::ZIncrBy { key, .. }
        | StoreCommand::ZScore { key, .. }
        | StoreCommand::ZRange { key, .. }
        | StoreCommand::ZRemRangeByRank { key, .. }
        | StoreCommand::ZRem { key, .. }
        | StoreCommand::Del { key }
        | StoreCommand::Pttl { key } => vec![key.as_str()],
    }
}
