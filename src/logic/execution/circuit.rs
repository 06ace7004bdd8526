//! Circuit Breaker
//!
//! Per-(action, target) failure-tripped switch. Closed -> Open after N
//! consecutive failures; Open -> HalfOpen once the cooldown elapses;
//! HalfOpen -> Closed after M consecutive successes; any HalfOpen failure
//! reopens. State is created lazily on first attempt and lives for the
//! process lifetime (long-idle entries are swept).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Per-key breaker bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_transition: DateTime<Utc>,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
            last_transition: Utc::now(),
        }
    }
}

// ============================================================================
// BREAKER
// ============================================================================

pub struct CircuitBreaker {
    states: Mutex<HashMap<String, CircuitState>>,
    /// Closed -> Open after this many consecutive failures
    failure_threshold: u32,
    /// HalfOpen -> Closed after this many consecutive successes
    success_threshold: u32,
    /// Open -> HalfOpen after this cooldown
    cooldown_secs: i64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, cooldown_secs: i64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            cooldown_secs: cooldown_secs.max(1),
        }
    }

    /// Whether a call for this key may proceed. Moves Open -> HalfOpen once
    /// the cooldown has elapsed.
    pub fn allow(&self, key: &str) -> bool {
        let mut states = self.states.lock();
        let entry = states.entry(key.to_string()).or_insert_with(CircuitState::new);
        match entry.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = Utc::now().signed_duration_since(entry.last_transition);
                if elapsed >= Duration::seconds(self.cooldown_secs) {
                    log::info!("Circuit '{}' cooldown elapsed - probing (half-open)", key);
                    entry.state = BreakerState::HalfOpen;
                    entry.consecutive_successes = 0;
                    entry.last_transition = Utc::now();
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut states = self.states.lock();
        let entry = states.entry(key.to_string()).or_insert_with(CircuitState::new);
        entry.consecutive_failures = 0;
        match entry.state {
            BreakerState::Closed => {}
            BreakerState::HalfOpen => {
                entry.consecutive_successes += 1;
                if entry.consecutive_successes >= self.success_threshold {
                    log::info!("Circuit '{}' recovered - closing", key);
                    entry.state = BreakerState::Closed;
                    entry.consecutive_successes = 0;
                    entry.last_transition = Utc::now();
                }
            }
            BreakerState::Open => {
                // Success without allow() probing; treat as recovery signal.
                entry.state = BreakerState::HalfOpen;
                entry.consecutive_successes = 1;
                entry.last_transition = Utc::now();
            }
        }
    }

    pub fn record_failure(&self, key: &str) {
        let mut states = self.states.lock();
        let entry = states.entry(key.to_string()).or_insert_with(CircuitState::new);
        entry.consecutive_successes = 0;
        entry.last_failure = Some(Utc::now());
        match entry.state {
            BreakerState::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= self.failure_threshold {
                    log::warn!(
                        "Circuit '{}' opened after {} consecutive failures",
                        key,
                        entry.consecutive_failures
                    );
                    entry.state = BreakerState::Open;
                    entry.last_transition = Utc::now();
                }
            }
            BreakerState::HalfOpen => {
                // Any failure while probing reopens immediately.
                log::warn!("Circuit '{}' failed while half-open - reopening", key);
                entry.state = BreakerState::Open;
                entry.consecutive_failures = 1;
                entry.last_transition = Utc::now();
            }
            BreakerState::Open => {
                entry.consecutive_failures += 1;
            }
        }
    }

    pub fn state(&self, key: &str) -> BreakerState {
        self.states
            .lock()
            .get(key)
            .map(|s| s.state)
            .unwrap_or(BreakerState::Closed)
    }

    pub fn tracked_count(&self) -> usize {
        self.states.lock().len()
    }

    /// Drop entries idle longer than the given horizon.
    pub fn sweep(&self, idle_secs: i64) -> usize {
        let cutoff = Utc::now() - Duration::seconds(idle_secs);
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|_, s| {
            s.state != BreakerState::Closed || s.last_transition > cutoff
        });
        before - states.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, 2, 60);
        let key = "block_ip|198.51.100.2";

        for _ in 0..4 {
            assert!(breaker.allow(key));
            breaker.record_failure(key);
        }
        assert_eq!(breaker.state(key), BreakerState::Closed);

        assert!(breaker.allow(key));
        breaker.record_failure(key);
        assert_eq!(breaker.state(key), BreakerState::Open);

        // Sixth call fails fast without invoking the handler.
        assert!(!breaker.allow(key));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(3, 1, 60);
        let key = "k";
        breaker.record_failure(key);
        breaker.record_failure(key);
        breaker.record_success(key);
        breaker.record_failure(key);
        breaker.record_failure(key);
        // Streak was broken; still closed at 2 consecutive.
        assert_eq!(breaker.state(key), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown_then_closes() {
        let breaker = CircuitBreaker::new(1, 2, 1);
        let key = "k";
        breaker.record_failure(key);
        assert_eq!(breaker.state(key), BreakerState::Open);
        assert!(!breaker.allow(key));

        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(breaker.allow(key));
        assert_eq!(breaker.state(key), BreakerState::HalfOpen);

        breaker.record_success(key);
        assert_eq!(breaker.state(key), BreakerState::HalfOpen);
        breaker.record_success(key);
        assert_eq!(breaker.state(key), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, 2, 1);
        let key = "k";
        breaker.record_failure(key);
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(breaker.allow(key));
        breaker.record_failure(key);
        assert_eq!(breaker.state(key), BreakerState::Open);
        assert!(!breaker.allow(key));
    }

    #[test]
    fn test_keys_are_independent() {
        let breaker = CircuitBreaker::new(1, 1, 60);
        breaker.record_failure("a");
        assert_eq!(breaker.state("a"), BreakerState::Open);
        assert_eq!(breaker.state("b"), BreakerState::Closed);
        assert!(breaker.allow("b"));
    }

    #[test]
    fn test_sweep_keeps_open_circuits() {
        let breaker = CircuitBreaker::new(1, 1, 60);
        breaker.record_failure("open-key");
        breaker.record_success("closed-key");
        // Horizon of zero: idle closed entries go, open entries stay.
        let evicted = breaker.sweep(0);
        assert_eq!(evicted, 1);
        assert_eq!(breaker.state("open-key"), BreakerState::Open);
    }
}
