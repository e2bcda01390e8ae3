//! Clock Abstraction for Deterministic Testing
//!
//! Counters derive bucket keys from "now", and the in-memory store measures
//! key expiry against the same notion of time. Both read it through
//! [`Clock`] so tests can pin and advance time explicitly.
//!
//! Implementations:
//! - `SystemClock`: Uses real system time
//! - `SimulatedClock`: Uses controlled virtual time

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of the current instant
pub trait Clock: Send + Sync + 'static {
    /// Get current time
    fn now(&self) -> DateTime<Utc>;

    /// Current time as Unix milliseconds
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock using real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Simulated clock for deterministic testing
///
/// Time only advances when explicitly told to via `advance()` or `set()`.
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    /// Current virtual time in Unix milliseconds
    time_ms: Arc<AtomicI64>,
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::from_millis(0)
    }
}

impl SimulatedClock {
    /// Create a new simulated clock starting at the given Unix milliseconds
    pub fn from_millis(start_ms: i64) -> Self {
        SimulatedClock {
            time_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Create a new simulated clock starting at the given instant
    pub fn at(start: DateTime<Utc>) -> Self {
        Self::from_millis(start.timestamp_millis())
    }

    /// Convenience constructor for a UTC calendar instant
    ///
    /// Out-of-range fields fall back to the Unix epoch.
    pub fn at_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let start = Utc
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .unwrap_or_default();
        Self::at(start)
    }

    /// Advance time by the given duration
    pub fn advance(&self, duration: Duration) {
        self.time_ms
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }

    /// Set the current time
    pub fn set(&self, instant: DateTime<Utc>) {
        self.time_ms
            .store(instant.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.time_ms.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    fn now_millis(&self) -> i64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}
