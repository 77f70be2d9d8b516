use chrono::{DateTime, Duration, Utc};

/// Source of "now" for every time-dependent rule.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Length of one day, the unit of every loan and fine rule.
pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

/// Whole days elapsed from `from` to `to`, rounded down. Negative when `to`
/// is before `from`.
pub fn whole_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().div_euclid(days(1).num_milliseconds())
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::*;
    use parking_lot::Mutex;

    /// Clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        /// A clock starting at 2024-01-01T00:00:00Z.
        pub fn at_epoch() -> Self {
            Self::new(DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default())
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock();
            *now += by;
        }

        pub fn set(&self, to: DateTime<Utc>) {
            *self.now.lock() = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_days_rounds_down() {
        let start = ManualClock::at_epoch().now();

        assert_eq!(whole_days_between(start, start), 0);
        assert_eq!(whole_days_between(start, start + Duration::hours(23)), 0);
        assert_eq!(whole_days_between(start, start + Duration::hours(49)), 2);
        assert_eq!(whole_days_between(start, start - Duration::hours(1)), -1);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_epoch();
        let start = clock.now();

        clock.advance(days(35));
        assert_eq!(clock.now() - start, days(35));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
