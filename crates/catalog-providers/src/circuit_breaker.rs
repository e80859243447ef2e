// crates/catalog-providers/src/circuit_breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Three-state failure gate protecting the AI provider (spec
// §4.5).
// Purpose: Stop hammering a failing AI provider and give it a cool-down
// window before probing again.
// Dependencies: catalog-core, std::sync
// ============================================================================

use std::sync::Mutex;

use catalog_core::time::Timestamp;
use time::Duration;
use time::OffsetDateTime;

/// Circuit breaker state (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Traffic flows normally.
    Closed,
    /// Traffic is refused; a typed error is returned without calling the
    /// provider.
    Open,
    /// A single probe call is allowed through to test recovery.
    HalfOpen,
}

/// A snapshot of the breaker's observable state (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures observed since the last success/reset.
    pub failure_count: u32,
    /// Successes observed since the breaker last closed.
    pub success_count: u32,
    /// Time of the most recent failure, if any.
    pub last_failure_at: Option<Timestamp>,
    /// Whether a caller may currently attempt a call.
    pub can_proceed: bool,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Timestamp>,
    opened_at: Option<Timestamp>,
    /// Set once a half-open probe has been handed out, so only one probe is
    /// in flight at a time.
    probe_in_flight: bool,
}

/// Three-state circuit breaker guarding calls to the AI provider (spec
/// §4.5).
///
/// # Invariants
/// - `closed -> open` only after `failure_threshold` *consecutive* failures.
/// - `open -> half_open` only after `cooldown` has elapsed.
/// - `half_open -> closed` on a successful probe; `half_open -> open` on any
///   probe failure.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given threshold and cool-down.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                opened_at: None,
                probe_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Returns whether a caller may attempt a call right now. In the
    /// `half_open` state this hands out at most one probe permit; subsequent
    /// callers are refused until the probe resolves.
    pub fn can_proceed(&self) -> bool {
        let mut guard = self.lock();
        self.transition_if_cooled_down(&mut guard);
        match guard.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if guard.probe_in_flight {
                    false
                } else {
                    guard.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful call. In `half_open`, this closes the breaker;
    /// in `closed`, it resets the consecutive-failure counter.
    pub fn record_success(&self) {
        let mut guard = self.lock();
        guard.success_count += 1;
        guard.failure_count = 0;
        guard.probe_in_flight = false;
        guard.state = CircuitState::Closed;
        guard.opened_at = None;
    }

    /// Records a failed call. Opens the breaker if the consecutive-failure
    /// count reaches the threshold, or immediately on any half-open probe
    /// failure.
    pub fn record_failure(&self) {
        let now = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        let mut guard = self.lock();
        guard.last_failure_at = Some(now);
        guard.probe_in_flight = false;
        match guard.state {
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                guard.opened_at = Some(now);
            }
            CircuitState::Closed | CircuitState::Open => {
                guard.failure_count += 1;
                if guard.failure_count >= self.failure_threshold {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(now);
                }
            }
        }
    }

    /// Returns a snapshot of the breaker's current observable state (spec
    /// §4.5).
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut guard = self.lock();
        self.transition_if_cooled_down(&mut guard);
        let can_proceed = match guard.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !guard.probe_in_flight,
        };
        CircuitSnapshot {
            state: guard.state,
            failure_count: guard.failure_count,
            success_count: guard.success_count,
            last_failure_at: guard.last_failure_at,
            can_proceed,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Moves `open -> half_open` once `cooldown` has elapsed since opening.
    fn transition_if_cooled_down(&self, guard: &mut Inner) {
        if guard.state != CircuitState::Open {
            return;
        }
        let Some(opened_at) = guard.opened_at else { return };
        let now = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        if opened_at.elapsed_since(now) >= self.cooldown {
            guard.state = CircuitState::HalfOpen;
            guard.probe_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_consecutive_failure_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::seconds(30));
        for _ in 0..2 {
            assert!(breaker.can_proceed());
            breaker.record_failure();
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert!(breaker.can_proceed());
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
        assert!(!breaker.can_proceed());
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::seconds(-1));
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
        // cooldown is negative so it has already "elapsed"
        assert!(breaker.can_proceed());
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::seconds(-1));
        breaker.record_failure();
        assert!(breaker.can_proceed());
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn only_one_probe_permit_while_half_open() {
        let breaker = CircuitBreaker::new(1, Duration::seconds(-1));
        breaker.record_failure();
        assert!(breaker.can_proceed());
        assert!(!breaker.can_proceed());
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let breaker = CircuitBreaker::new(3, Duration::seconds(30));
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.snapshot().failure_count, 0);
    }
}
