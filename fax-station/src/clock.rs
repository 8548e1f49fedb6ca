//! Local wall clock
//!
//! The zone is a cached value with one writer (whatever learns the
//! device's location) and many readers. Until a zone is learned the
//! configured zone applies. A learned zone stays in effect until replaced;
//! the writer uses [`LocalClock::is_stale`] to decide when to refresh it.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct Learned {
    tz: Tz,
    updated_at: Instant,
}

#[derive(Debug)]
pub struct LocalClock {
    fallback: Tz,
    learned: RwLock<Option<Learned>>,
}

impl LocalClock {
    pub fn new(fallback: Tz) -> Self {
        Self {
            fallback,
            learned: RwLock::new(None),
        }
    }

    /// Zone currently in effect
    pub fn timezone(&self) -> Tz {
        self.learned
            .read()
            .map(|learned| learned.tz)
            .unwrap_or(self.fallback)
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone())
    }

    /// Local hour of day, 0..=23
    pub fn hour(&self) -> u32 {
        self.now().hour()
    }

    /// Writer side, for the external locator that resolves the device's zone
    ///
    /// The station itself never calls this; without a locator the
    /// configured `TIMEZONE` stays in effect.
    pub fn set_timezone(&self, tz: Tz) {
        let mut learned = self.learned.write();
        if learned.map(|l| l.tz) != Some(tz) {
            info!(timezone = %tz, "Local timezone updated");
        }
        *learned = Some(Learned {
            tz,
            updated_at: Instant::now(),
        });
    }

    /// True when no zone was learned or it is older than `max_age`
    ///
    /// Lets the locator decide when to look the zone up again.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match *self.learned.read() {
            None => true,
            Some(learned) => learned.updated_at.elapsed() > max_age,
        }
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    #[test]
    fn test_fallback_zone() {
        let clock = LocalClock::new(chrono_tz::Asia::Tokyo);
        assert_eq!(clock.timezone(), chrono_tz::Asia::Tokyo);
        assert_eq!(clock.now().offset().fix().local_minus_utc(), 9 * 3600);
        assert!(clock.hour() < 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_learned_zone_and_staleness() {
        let clock = LocalClock::default();
        assert!(clock.is_stale(Duration::from_secs(3600)));

        clock.set_timezone(chrono_tz::Europe::Rome);
        assert_eq!(clock.timezone(), chrono_tz::Europe::Rome);
        assert!(!clock.is_stale(Duration::from_secs(3600)));

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert!(clock.is_stale(Duration::from_secs(3600)));
        // Stale zones stay in effect until replaced
        assert_eq!(clock.timezone(), chrono_tz::Europe::Rome);
    }
}
