use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Account epoch: Wednesday, January 1, 2020 00:00:00 UTC
pub const KEYGATE_EPOCH: Duration = Duration::from_millis(1_577_836_800_000);

/// A trait for time sources that return a wall-clock timestamp.
///
/// This abstraction allows you to plug in the real system clock or a mocked
/// time source in tests.
///
/// The unit is expected to be **milliseconds** relative to a configurable
/// origin.
///
/// # Example
///
/// ```
/// use keygate::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the configured epoch.
    fn current_millis(&self) -> u64;
}

/// A wall-clock time source offset from a fixed epoch.
///
/// Every read goes through `SystemTime::now()`, so a backwards step of the
/// host clock (NTP correction, manual change) is visible to callers. The
/// allocator treats a regressed reading as "not yet" and waits for the clock
/// to catch up instead of re-issuing a timestamp.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch: Duration,
}

impl Default for SystemClock {
    /// Constructs a clock aligned to [`KEYGATE_EPOCH`].
    fn default() -> Self {
        Self::with_epoch(KEYGATE_EPOCH)
    }
}

impl SystemClock {
    /// Constructs a clock using `epoch` (a [`Duration`] since 1970-01-01 UTC)
    /// as the origin (t = 0).
    pub const fn with_epoch(epoch: Duration) -> Self {
        Self { epoch }
    }

    /// The origin this clock measures from.
    pub const fn epoch(&self) -> Duration {
        self.epoch
    }
}

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        // A host clock set before the epoch saturates to zero rather than
        // wrapping around.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_sub(self.epoch)
            .as_millis() as u64
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_offset_from_epoch() {
        let unix_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let clock = SystemClock::default();
        let now = clock.current_millis();

        let expected = unix_millis - KEYGATE_EPOCH.as_millis() as u64;
        assert!(now >= expected);
        assert!(now - expected < 1_000);
    }

    #[test]
    fn clock_before_epoch_saturates() {
        let clock = SystemClock::with_epoch(Duration::from_millis(u64::MAX));
        assert_eq!(clock.current_millis(), 0);
    }
}
