//! Counter factory bound to one store and clock

use super::counter::Counter;
use super::types::CounterOptions;
use crate::store::{Clock, MemoryStore, Store, SystemClock};
use std::sync::Arc;

/// Hands out [`Counter`]s that share a store, a clock and default options
pub struct Metrics<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    defaults: CounterOptions,
}

impl<S: Store> Clone for Metrics<S> {
    fn clone(&self) -> Self {
        Metrics {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            defaults: self.defaults.clone(),
        }
    }
}

impl<S: Store> Metrics<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Metrics {
            store: Arc::new(store),
            clock,
            defaults: CounterOptions::default(),
        }
    }

    /// Options used by [`Metrics::event`]
    pub fn with_defaults(mut self, defaults: CounterOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &CounterOptions {
        &self.defaults
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Counter for `event` with explicit options
    pub fn counter(&self, event: &str, options: CounterOptions) -> Counter<S> {
        Counter::new(Arc::clone(&self.store), Arc::clone(&self.clock), event, &options)
    }

    /// Counter for `event` with the default options
    pub fn event(&self, event: &str) -> Counter<S> {
        Counter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            event,
            &self.defaults,
        )
    }
}

impl Metrics<MemoryStore> {
    /// In-process store whose key expiry follows `clock`
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let store = MemoryStore::with_clock(Arc::clone(&clock));
        Self::with_clock(store, clock)
    }
}

#[cfg(feature = "redis")]
impl Metrics<crate::store::RedisStore> {
    /// Connect to the configured Redis server
    pub async fn connect(config: &crate::config::MetricsConfig) -> super::Result<Self> {
        let store = crate::store::RedisStore::connect(&config.redis_url).await?;
        Ok(Self::new(store).with_defaults(config.counter_options()))
    }
}
