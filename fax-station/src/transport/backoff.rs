//! Reconnection backoff
//!
//! Grows by a third after every failure (`next = cur + cur / 3`) up to a cap,
//! and snaps back to the initial delay after a successful connection.
//! There is no attempt limit.

use std::time::Duration;

/// First delay after a failure
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Upper bound for the delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the delay for this failure and grow it for the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (delay + delay / 3).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_RETRY_DELAY, MAX_RETRY_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_factor() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        let second = backoff.next_delay();
        assert!(second > Duration::from_millis(6600) && second < Duration::from_millis(6700));
    }

    #[test]
    fn test_never_exceeds_cap() {
        let mut backoff = Backoff::default();
        let mut last = Duration::ZERO;
        for _ in 0..200 {
            let delay = backoff.next_delay();
            assert!(delay <= MAX_RETRY_DELAY);
            assert!(delay >= last);
            last = delay;
        }
        assert_eq!(last, MAX_RETRY_DELAY);
    }

    #[test]
    fn test_reset_after_success() {
        let mut backoff = Backoff::default();
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert!(backoff.current() > INITIAL_RETRY_DELAY);

        backoff.reset();
        assert_eq!(backoff.current(), INITIAL_RETRY_DELAY);
        assert_eq!(backoff.next_delay(), INITIAL_RETRY_DELAY);
    }
}
