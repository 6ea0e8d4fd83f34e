//! Time types used by segments and QoS.
//!
//! - [`ClockTime`]: an unsigned nanosecond timestamp (8 bytes, Copy)
//! - [`ClockTimeDiff`]: a signed nanosecond difference, as carried by QoS
//!
//! Unset times are expressed as `Option<ClockTime>` rather than a sentinel.

use std::time::Duration;

/// Signed difference between two times, in nanoseconds.
///
/// Positive values mean "late" when used as QoS jitter.
pub type ClockTimeDiff = i64;

/// Time in nanoseconds.
///
/// ```rust
/// use parallax_transform::clock::ClockTime;
///
/// let t = ClockTime::from_secs(1) + ClockTime::from_millis(500);
/// assert_eq!(t.millis(), 1500);
/// assert_eq!(format!("{}", t), "1.500000000s");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// Largest representable time.
    pub const MAX: Self = Self(u64::MAX);

    /// Nanoseconds per second.
    pub const SECOND: u64 = 1_000_000_000;

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from microseconds.
    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(Self::SECOND))
    }

    /// Nanoseconds.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Milliseconds (truncated).
    #[inline]
    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Seconds (truncated).
    #[inline]
    pub const fn secs(self) -> u64 {
        self.0 / Self::SECOND
    }

    /// Checked addition.
    #[inline]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction; `None` on underflow.
    #[inline]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating subtraction.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Apply a signed offset, clamping at zero and `MAX`.
    #[inline]
    pub const fn saturating_add_signed(self, diff: ClockTimeDiff) -> Self {
        Self(self.0.saturating_add_signed(diff))
    }

    /// Signed difference `self - earlier`, saturating at the `i64` bounds.
    #[inline]
    pub fn diff(self, earlier: Self) -> ClockTimeDiff {
        let d = self.0 as i128 - earlier.0 as i128;
        d.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<ClockTime> for Duration {
    #[inline]
    fn from(t: ClockTime) -> Self {
        Duration::from_nanos(t.0)
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}s", self.secs(), self.0 % Self::SECOND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_conversions() {
        let t = ClockTime::from_millis(1500);
        assert_eq!(t.nanos(), 1_500_000_000);
        assert_eq!(t.secs(), 1);
        assert_eq!(Duration::from(t), Duration::from_millis(1500));
        assert_eq!(ClockTime::from(Duration::from_micros(7)), ClockTime::from_micros(7));
    }

    #[test]
    fn test_clock_time_signed_offsets() {
        let t = ClockTime::from_millis(10);
        assert_eq!(t.saturating_add_signed(-5_000_000), ClockTime::from_millis(5));
        assert_eq!(t.saturating_add_signed(-50_000_000), ClockTime::ZERO);
        assert_eq!(ClockTime::from_millis(3).diff(ClockTime::from_millis(5)), -2_000_000);
    }

    #[test]
    fn test_clock_time_display() {
        assert_eq!(ClockTime::from_millis(2250).to_string(), "2.250000000s");
    }
}
