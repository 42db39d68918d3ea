//! # Fibonacci Backoff
//!
//! Backoff schedule for builds whose reconciliation keeps failing.
//! Fibonacci growth is gentler than exponential backoff, which suits
//! reconciles that often recover after one or two retries (transient
//! compute API errors, eventual-consistency reads).
//!
//! The sequence is calculated in minutes: 1m, 1m, 2m, 3m, 5m, 8m, 10m (max).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fibonacci backoff calculator.
///
/// Each backoff is the sum of the previous two, capped at a maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff value in minutes (for reset)
    min_minutes: u64,
    /// Previous backoff value in minutes
    prev_minutes: u64,
    /// Current backoff value in minutes
    current_minutes: u64,
    /// Maximum backoff value in minutes
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given bounds in minutes.
    ///
    /// The first two values are both `min_minutes`; the sequence is
    /// capped at `max_minutes`.
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Get the next backoff duration and advance the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = Duration::from_secs(self.current_minutes * 60);

        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = std::cmp::min(next_minutes, self.max_minutes);

        result
    }

    /// Reset the backoff to the initial state after a successful tick.
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[derive(Debug)]
struct BackoffEntry {
    backoff: FibonacciBackoff,
    error_count: u32,
}

/// Per-build backoff state, keyed by `namespace/name`.
///
/// Entries must be forgotten when a build is torn down; the registry
/// otherwise keeps a key for every build the controller ever saw.
#[derive(Debug, Default)]
pub struct BackoffRegistry {
    states: Mutex<HashMap<String, BackoffEntry>>,
}

impl BackoffRegistry {
    /// Records a failed tick and returns the consecutive error count
    /// together with the delay before the next retry.
    pub fn failure(&self, key: &str) -> (u32, Duration) {
        let mut states = self.lock();
        let entry = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffEntry {
                backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
                error_count: 0,
            });
        entry.error_count += 1;
        (entry.error_count, entry.backoff.next_backoff())
    }

    /// Records a successful tick. Returns true when the build had been
    /// failing.
    pub fn reset(&self, key: &str) -> bool {
        let mut states = self.lock();
        match states.get_mut(key) {
            Some(entry) if entry.error_count > 0 => {
                entry.error_count = 0;
                entry.backoff.reset();
                true
            }
            _ => false,
        }
    }

    /// Drops the build's entry entirely, for builds that no longer
    /// exist.
    pub fn forget(&self, key: &str) {
        self.lock().remove(key);
    }

    #[cfg(test)]
    fn tracked(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BackoffEntry>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        // 1m, 1m, 2m, 3m, 5m, 8m, then capped at 10m
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(180));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(300));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(480));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(600));
        // 13m would follow, but the cap holds
        assert_eq!(backoff.next_backoff(), Duration::from_secs(600));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(600));
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));

        backoff.reset();

        // Restarts from the beginning after a success
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
    }

    #[test]
    fn test_registry_tracks_failures_per_build() {
        let registry = BackoffRegistry::default();

        let (errors, delay) = registry.failure("default/b1");
        assert_eq!(errors, 1);
        assert_eq!(delay, Duration::from_secs(60));
        let (errors, _) = registry.failure("default/b1");
        assert_eq!(errors, 2);

        // Another build starts its own sequence.
        let (errors, delay) = registry.failure("default/b2");
        assert_eq!(errors, 1);
        assert_eq!(delay, Duration::from_secs(60));

        // A successful tick rewinds the failing build.
        assert!(registry.reset("default/b1"));
        assert!(!registry.reset("default/b1"));
        let (errors, delay) = registry.failure("default/b1");
        assert_eq!(errors, 1);
        assert_eq!(delay, Duration::from_secs(60));
    }

    #[test]
    fn test_registry_forgets_torn_down_builds() {
        let registry = BackoffRegistry::default();

        registry.failure("default/b1");
        assert!(registry.tracked("default/b1"));

        registry.forget("default/b1");
        assert!(!registry.tracked("default/b1"));
        // Forgetting an unknown build is a no-op.
        registry.forget("default/b1");
    }
}
