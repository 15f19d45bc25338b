//! Keyed circuit breakers
//!
//! Each key (for example `"wallet:retry"`) owns an independent breaker with
//! three states:
//! - **Closed**: attempts pass; consecutive failures are counted
//! - **Open**: attempts are rejected until the cool-down has elapsed
//! - **Half-Open**: a bounded number of trial attempts pass; a success closes
//!   the breaker, a failure re-opens it
//!
//! Transitions out of `Open` happen lazily inside [`CircuitBreakerRegistry::try_acquire`];
//! there are no background timers. Entering half-open arms a trial deadline of
//! one recovery time; trials still unresolved at that deadline are treated as
//! failed and a fresh trial is admitted. Entries are created on the first recorded
//! failure and live as long as the registry.
//!
//! The lock is only held for the duration of a single check or record. A
//! caller that checks, awaits an operation, then records is not atomic as a
//! whole: two concurrent callers on one key may both pass the check before
//! either records its failure. That tolerance is accepted.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - attempts pass through
    Closed,
    /// Failing fast - attempts are rejected
    Open,
    /// Probing whether the dependency recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for every breaker in a registry
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Cool-down between opening and the first half-open trial
    pub recovery_time: Duration,
    /// Trial attempts admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_time: Duration::from_millis(60_000),
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    failures: u32,
    last_failure_time: Option<Instant>,
    state: CircuitState,
    next_attempt_time: Option<Instant>,
    half_open_calls: u32,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            failures: 0,
            last_failure_time: None,
            state: CircuitState::Closed,
            next_attempt_time: None,
            half_open_calls: 0,
        }
    }

    /// State as a check at `now` would see it
    fn effective_state(&self, now: Instant) -> CircuitState {
        match (self.state, self.next_attempt_time) {
            (CircuitState::Open, Some(next)) if now >= next => CircuitState::HalfOpen,
            (state, _) => state,
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerSnapshot {
    pub key: String,
    pub failures: u32,
    pub state: CircuitState,
    pub last_failure_time: Option<Instant>,
    pub next_attempt_time: Option<Instant>,
}

/// Registry of breakers keyed by string
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, BreakerEntry>>,
    rejected_calls: AtomicU64,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
            rejected_calls: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check whether an attempt for `key` may proceed
    ///
    /// An open breaker whose cool-down has elapsed moves to half-open here
    /// and admits this attempt.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut breakers = self.breakers.lock();
        let Some(entry) = breakers.get_mut(key) else {
            return true;
        };

        let allowed = match entry.state {
            CircuitState::Closed => true,
            CircuitState::Open => match entry.next_attempt_time {
                Some(next) if now >= next => {
                    entry.state = CircuitState::HalfOpen;
                    entry.half_open_calls = 1;
                    entry.next_attempt_time = Some(now + self.config.recovery_time);
                    info!("Circuit breaker '{}' transitioning to half-open", key);
                    true
                }
                _ => false,
            },
            CircuitState::HalfOpen => {
                if entry.half_open_calls < self.config.half_open_max_calls {
                    entry.half_open_calls += 1;
                    true
                } else if entry.next_attempt_time.map_or(true, |deadline| now >= deadline) {
                    // Trials that never reported back (dropped futures) count as failed
                    entry.failures = entry.failures.saturating_add(1);
                    entry.half_open_calls = 1;
                    entry.next_attempt_time = Some(now + self.config.recovery_time);
                    warn!(
                        "Circuit breaker '{}' half-open trial never completed, admitting a new one",
                        key
                    );
                    true
                } else {
                    false
                }
            }
        };

        if !allowed {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            debug!("Circuit breaker '{}' rejected attempt ({})", key, entry.state);
        }
        allowed
    }

    /// Record a successful attempt: close the breaker and forget failures
    pub fn record_success(&self, key: &str) {
        let mut breakers = self.breakers.lock();
        let Some(entry) = breakers.get_mut(key) else {
            return;
        };

        if entry.state != CircuitState::Closed {
            info!(
                "Circuit breaker '{}' closing after successful {} attempt",
                key, entry.state
            );
        }
        entry.state = CircuitState::Closed;
        entry.failures = 0;
        entry.half_open_calls = 0;
        entry.next_attempt_time = None;
    }

    /// Record a failed attempt, opening the breaker when warranted
    pub fn record_failure(&self, key: &str) {
        let now = Instant::now();
        let mut breakers = self.breakers.lock();
        let entry = breakers
            .entry(key.to_string())
            .or_insert_with(BreakerEntry::new);

        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure_time = Some(now);

        match entry.state {
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.next_attempt_time = Some(now + self.config.recovery_time);
                entry.half_open_calls = 0;
                warn!(
                    "Circuit breaker '{}' reopening after failure in half-open state",
                    key
                );
            }
            CircuitState::Closed if entry.failures >= self.config.failure_threshold => {
                entry.state = CircuitState::Open;
                entry.next_attempt_time = Some(now + self.config.recovery_time);
                warn!(
                    "Circuit breaker '{}' opening after {} consecutive failures",
                    key, entry.failures
                );
            }
            _ => {}
        }
    }

    /// Effective state of `key`; unknown keys are closed
    pub fn state(&self, key: &str) -> CircuitState {
        let now = Instant::now();
        self.breakers
            .lock()
            .get(key)
            .map_or(CircuitState::Closed, |entry| entry.effective_state(now))
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        self.breakers.lock().get(key).map_or(0, |entry| entry.failures)
    }

    pub fn snapshot(&self, key: &str) -> Option<CircuitBreakerSnapshot> {
        let now = Instant::now();
        self.breakers
            .lock()
            .get(key)
            .map(|entry| Self::to_snapshot(key, entry, now))
    }

    /// Snapshots of every known breaker, sorted by key
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<_> = self
            .breakers
            .lock()
            .iter()
            .map(|(key, entry)| Self::to_snapshot(key, entry, now))
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Force a breaker closed; returns whether the key was known
    pub fn reset(&self, key: &str) -> bool {
        let mut breakers = self.breakers.lock();
        match breakers.get_mut(key) {
            Some(entry) => {
                *entry = BreakerEntry::new();
                info!("Circuit breaker '{}' forcibly closed", key);
                true
            }
            None => false,
        }
    }

    /// Attempts rejected by an open or saturated breaker
    pub fn rejected_calls(&self) -> u64 {
        self.rejected_calls.load(Ordering::Relaxed)
    }

    fn to_snapshot(key: &str, entry: &BreakerEntry, now: Instant) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            key: key.to_string(),
            failures: entry.failures,
            state: entry.effective_state(now),
            last_failure_time: entry.last_failure_time,
            next_attempt_time: entry.next_attempt_time,
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn registry(threshold: u32) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_is_closed() {
        let breakers = registry(5);
        assert!(breakers.try_acquire("cart:retry"));
        assert_eq!(breakers.state("cart:retry"), CircuitState::Closed);
        assert!(breakers.snapshot("cart:retry").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_on_threshold() {
        let breakers = registry(3);

        for i in 0..3 {
            assert!(breakers.try_acquire("k"));
            breakers.record_failure("k");
            if i < 2 {
                assert_eq!(breakers.state("k"), CircuitState::Closed);
            }
        }

        assert_eq!(breakers.state("k"), CircuitState::Open);
        assert!(!breakers.try_acquire("k"));
        assert_eq!(breakers.rejected_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_recovery_time() {
        let breakers = registry(1);
        breakers.record_failure("k");
        assert!(!breakers.try_acquire("k"));

        advance(Duration::from_millis(59_999)).await;
        assert!(!breakers.try_acquire("k"));

        advance(Duration::from_millis(1)).await;
        assert!(breakers.try_acquire("k"));
        assert_eq!(breakers.state("k"), CircuitState::HalfOpen);

        // only one trial call while half-open
        assert!(!breakers.try_acquire("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let breakers = registry(2);
        breakers.record_failure("k");
        breakers.record_failure("k");
        advance(Duration::from_secs(60)).await;

        assert!(breakers.try_acquire("k"));
        breakers.record_success("k");

        assert_eq!(breakers.state("k"), CircuitState::Closed);
        assert_eq!(breakers.failures("k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breakers = registry(2);
        breakers.record_failure("k");
        breakers.record_failure("k");
        advance(Duration::from_secs(60)).await;

        assert!(breakers.try_acquire("k"));
        breakers.record_failure("k");

        let snapshot = breakers.snapshot("k").unwrap();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(
            snapshot.next_attempt_time,
            Some(Instant::now() + Duration::from_secs(60))
        );
        assert!(!breakers.try_acquire("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_half_open_trial_expires() {
        let breakers = registry(1);
        breakers.record_failure("k");
        advance(Duration::from_secs(60)).await;

        // trial admitted, caller never records an outcome
        assert!(breakers.try_acquire("k"));
        assert!(!breakers.try_acquire("k"));

        advance(Duration::from_millis(59_999)).await;
        assert!(!breakers.try_acquire("k"));

        advance(Duration::from_millis(1)).await;
        assert!(breakers.try_acquire("k"));
        assert_eq!(breakers.state("k"), CircuitState::HalfOpen);
        assert_eq!(breakers.failures("k"), 2);

        breakers.record_success("k");
        assert_eq!(breakers.state("k"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let breakers = registry(1);
        breakers.record_failure("a");
        assert!(!breakers.try_acquire("a"));
        assert!(breakers.try_acquire("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes() {
        let breakers = registry(1);
        breakers.record_failure("k");
        assert!(breakers.reset("k"));
        assert!(breakers.try_acquire("k"));
        assert!(!breakers.reset("missing"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
