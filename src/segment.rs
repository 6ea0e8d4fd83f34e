//! Playback segments and running-time conversion.
//!
//! A segment describes which part of the stream is being played and at what
//! rate. QoS decisions compare buffers in *running time*, which is the
//! segment-relative position scaled by the playback rate and offset by the
//! segment base.

use crate::clock::ClockTime;

/// Format of segment positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SegmentFormat {
    /// Element-specific default format; carries no time information.
    #[default]
    Undefined,
    /// Positions in nanoseconds.
    Time,
    /// Positions in bytes.
    Bytes,
}

/// A contiguous range of the stream.
///
/// Positions are raw `u64` values whose unit depends on [`SegmentFormat`].
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Unit of all positions.
    pub format: SegmentFormat,
    /// Playback rate; negative for reverse playback, never zero.
    pub rate: f64,
    /// Rate already applied upstream.
    pub applied_rate: f64,
    /// Start of the segment.
    pub start: u64,
    /// End of the segment, if bounded.
    pub stop: Option<u64>,
    /// Stream time corresponding to `start`.
    pub time: u64,
    /// Running time accumulated by previous segments.
    pub base: u64,
}

impl Default for Segment {
    fn default() -> Self {
        Self::new(SegmentFormat::Undefined)
    }
}

impl Segment {
    /// Create an open segment starting at zero.
    pub fn new(format: SegmentFormat) -> Self {
        Self {
            format,
            rate: 1.0,
            applied_rate: 1.0,
            start: 0,
            stop: None,
            time: 0,
            base: 0,
        }
    }

    /// Create a time segment `[start, stop)`.
    pub fn time(start: ClockTime, stop: Option<ClockTime>) -> Self {
        Self {
            start: start.nanos(),
            stop: stop.map(ClockTime::nanos),
            time: start.nanos(),
            ..Self::new(SegmentFormat::Time)
        }
    }

    /// Set the playback rate.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the base running time.
    pub fn with_base(mut self, base: ClockTime) -> Self {
        self.base = base.nanos();
        self
    }

    /// Whether positions are in the time domain.
    #[inline]
    pub fn is_time(&self) -> bool {
        self.format == SegmentFormat::Time
    }

    fn contains(&self, position: u64) -> bool {
        position >= self.start && self.stop.is_none_or(|stop| position <= stop)
    }

    /// Convert a timestamp to running time.
    ///
    /// Returns `None` for non-time segments, positions outside the segment,
    /// and reverse playback without a stop position.
    pub fn to_running_time(&self, position: ClockTime) -> Option<ClockTime> {
        if !self.is_time() || self.rate == 0.0 {
            return None;
        }
        let position = position.nanos();
        if !self.contains(position) {
            return None;
        }

        let offset = if self.rate > 0.0 {
            position - self.start
        } else {
            self.stop? - position
        };

        let abs_rate = self.rate.abs();
        let scaled = if abs_rate == 1.0 {
            offset
        } else {
            (offset as f64 / abs_rate) as u64
        };
        ClockTime::from_nanos(scaled).checked_add(ClockTime::from_nanos(self.base))
    }

    /// Convert a timestamp to stream time.
    pub fn to_stream_time(&self, position: ClockTime) -> Option<ClockTime> {
        if !self.is_time() {
            return None;
        }
        let position = position.nanos();
        if !self.contains(position) {
            return None;
        }
        let offset = position - self.start;
        let abs_applied = self.applied_rate.abs();
        let scaled = if abs_applied == 1.0 {
            offset
        } else {
            (offset as f64 * abs_applied) as u64
        };
        if self.applied_rate >= 0.0 {
            self.time.checked_add(scaled).map(ClockTime::from_nanos)
        } else {
            self.time.checked_sub(scaled).map(ClockTime::from_nanos)
        }
    }
}
