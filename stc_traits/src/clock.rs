use chrono::{DateTime, Duration, Utc};

/// Wall-clock abstraction used for record timestamps and lookback windows.
///
/// - now(): current UTC time
/// - since(): helper returning `now() - window`
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Start of a lookback window ending now.
    fn since(&self, window: Duration) -> DateTime<Utc> {
        self.now() - window
    }
}

/// Default clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// now() = origin + offset
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: DateTime<Utc>,
    offset: std::sync::Arc<std::sync::Mutex<Duration>>,
}

impl ManualClock {
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            offset: std::sync::Arc::new(std::sync::Mutex::new(Duration::zero())),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off += d;
        }
    }

    /// Set the absolute offset relative to origin.
    pub fn set_offset(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = d;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let off = self.offset.lock().map(|g| *g).unwrap_or_else(|_| Duration::zero());
        self.origin + off
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_only_when_told() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::starting_at(t0);
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::minutes(10));
        assert_eq!(clock.now(), t0 + Duration::minutes(10));
        assert_eq!(clock.since(Duration::hours(1)), t0 - Duration::minutes(50));
        clock.set_offset(Duration::zero());
        assert_eq!(clock.now(), t0);
    }
}
