//! Reconnect state machine with exponential backoff.
//!
//! Implemented as an explicit state + attempt-count struct rather than
//! recursive timer scheduling, so cancellation and testing stay simple.
//! Adapters embed one [`Reconnector`] behind a mutex and drive it from their
//! `reconnect()` implementation.

use std::time::Duration;

/// Where the reconnect loop currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    /// Not reconnecting; the last connect attempt (if any) succeeded.
    Idle,
    /// A reconnect loop is in flight. A second concurrent `reconnect()`
    /// call is a no-op while in this phase.
    Reconnecting,
    /// `max_attempts` was exceeded. No further retries until an external
    /// `reconnect()` call resets the counter.
    GaveUp,
}

/// Outcome of recording a failed connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sleep this long before the next attempt: `base_delay × 2^(attempt−1)`.
    RetryAfter(Duration),
    /// The attempt budget is spent.
    GaveUp,
}

/// Exponential-backoff reconnect bookkeeping.
#[derive(Debug, Clone)]
pub struct Reconnector {
    phase: ReconnectPhase,
    attempts: u32,
    base_delay: Duration,
    max_attempts: u32,
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 5)
    }
}

impl Reconnector {
    /// Create a reconnector with the given base delay and attempt budget.
    #[must_use]
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            phase: ReconnectPhase::Idle,
            attempts: 0,
            base_delay,
            max_attempts,
        }
    }

    /// Try to start a reconnect loop.
    ///
    /// Returns `false` when a loop is already in flight (the caller must
    /// back off). From [`ReconnectPhase::GaveUp`] this resets the attempt
    /// counter, honoring the contract that an external call revives a
    /// given-up adapter.
    pub fn begin(&mut self) -> bool {
        match self.phase {
            ReconnectPhase::Reconnecting => false,
            ReconnectPhase::GaveUp => {
                self.attempts = 0;
                self.phase = ReconnectPhase::Reconnecting;
                true
            }
            ReconnectPhase::Idle => {
                self.phase = ReconnectPhase::Reconnecting;
                true
            }
        }
    }

    /// Record a failed connect attempt and compute what to do next.
    pub fn record_failure(&mut self) -> Backoff {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            self.phase = ReconnectPhase::GaveUp;
            return Backoff::GaveUp;
        }
        let exponent = self.attempts.saturating_sub(1).min(16);
        Backoff::RetryAfter(self.base_delay * 2u32.pow(exponent))
    }

    /// Record a confirmed successful reconnect: attempt counter resets.
    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.phase = ReconnectPhase::Idle;
    }

    #[must_use]
    pub fn phase(&self) -> ReconnectPhase {
        self.phase
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_double_delay_on_each_failed_attempt() {
        let mut r = Reconnector::new(Duration::from_millis(1000), 5);
        assert!(r.begin());

        let expected = [1000u64, 2000, 4000, 8000, 16000];
        for ms in expected {
            assert_eq!(
                r.record_failure(),
                Backoff::RetryAfter(Duration::from_millis(ms))
            );
        }
    }

    #[test]
    fn should_give_up_when_attempts_exceed_budget() {
        let mut r = Reconnector::new(Duration::from_millis(1000), 5);
        assert!(r.begin());
        for _ in 0..5 {
            assert!(matches!(r.record_failure(), Backoff::RetryAfter(_)));
        }

        // 6th failure exceeds max_attempts=5
        assert_eq!(r.record_failure(), Backoff::GaveUp);
        assert_eq!(r.phase(), ReconnectPhase::GaveUp);
    }

    #[test]
    fn should_reject_concurrent_begin_while_reconnecting() {
        let mut r = Reconnector::default();
        assert!(r.begin());
        assert!(!r.begin());
    }

    #[test]
    fn should_reset_counter_when_begun_from_gave_up() {
        let mut r = Reconnector::new(Duration::from_millis(100), 1);
        assert!(r.begin());
        r.record_failure();
        assert_eq!(r.record_failure(), Backoff::GaveUp);

        // external reconnect() call revives the machine
        assert!(r.begin());
        assert_eq!(r.attempts(), 0);
        assert_eq!(
            r.record_failure(),
            Backoff::RetryAfter(Duration::from_millis(100))
        );
    }

    #[test]
    fn should_reset_counter_on_success() {
        let mut r = Reconnector::default();
        assert!(r.begin());
        r.record_failure();
        r.record_failure();
        r.record_success();
        assert_eq!(r.attempts(), 0);
        assert_eq!(r.phase(), ReconnectPhase::Idle);

        // the next loop starts from the base delay again
        assert!(r.begin());
        assert_eq!(
            r.record_failure(),
            Backoff::RetryAfter(Duration::from_millis(1000))
        );
    }
}
