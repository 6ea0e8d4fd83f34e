//! Events exchanged between adjacent stages.
//!
//! Events are categorized by their flow direction:
//!
//! - [`Event`]: flows downstream with the data (caps, segment, flush, gap, EOS)
//! - [`UpstreamEvent`]: flows against the data (QoS feedback, reconfigure)
//!
//! QoS drops are additionally reported out of band as a [`QosMessage`] to the
//! stage's [`QosObserver`].
//!
//! # Example
//!
//! ```rust
//! use parallax_transform::event::{Event, FlushStopEvent};
//!
//! let event = Event::FlushStop(FlushStopEvent { reset_time: true });
//! assert!(!event.is_serialized());
//! assert_eq!(event.name(), "flush-stop");
//! ```

use crate::clock::{ClockTime, ClockTimeDiff};
use crate::format::Caps;
use crate::segment::Segment;

// ============================================================================
// Downstream Events
// ============================================================================

/// Events that flow downstream through a stage.
#[derive(Debug, Clone)]
pub enum Event {
    /// Fixed caps for the buffers that follow.
    Caps(Caps),

    /// Defines a playback segment (timeline).
    Segment(Segment),

    /// Gap in data (silence, black frames).
    Gap(GapEvent),

    /// End of stream - no more data will be produced.
    Eos,

    /// Flush start - unblock and discard in-flight work.
    FlushStart,

    /// Flush stop - resume normal operation.
    FlushStop(FlushStopEvent),
}

impl Event {
    /// Check if this event should be serialized with buffers.
    ///
    /// Flush events bypass queues for immediate effect.
    pub fn is_serialized(&self) -> bool {
        !matches!(self, Event::FlushStart | Event::FlushStop(_))
    }

    /// Get a human-readable name for this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Caps(_) => "caps",
            Event::Segment(_) => "segment",
            Event::Gap(_) => "gap",
            Event::Eos => "eos",
            Event::FlushStart => "flush-start",
            Event::FlushStop(_) => "flush-stop",
        }
    }
}

/// A stretch of stream time without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapEvent {
    /// Start of the gap.
    pub timestamp: ClockTime,
    /// Length of the gap, if known.
    pub duration: Option<ClockTime>,
}

/// Flush stop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushStopEvent {
    /// Whether running time restarts from zero.
    pub reset_time: bool,
}

// ============================================================================
// Upstream Events
// ============================================================================

/// Events that flow upstream, against the data.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Quality of Service feedback from downstream.
    Qos(QosEvent),

    /// Ask upstream to renegotiate at the next opportunity.
    Reconfigure,
}

impl UpstreamEvent {
    /// Get a human-readable name for this event type.
    pub fn name(&self) -> &'static str {
        match self {
            UpstreamEvent::Qos(_) => "qos",
            UpstreamEvent::Reconfigure => "reconfigure",
        }
    }
}

/// QoS feedback: downstream observed `timestamp` arriving `diff` late.
///
/// Negative `diff` means early.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QosEvent {
    /// Long-term ratio of processing speed to real time (1.0 = exactly real time).
    pub proportion: f64,
    /// Jitter of the observed buffer, in nanoseconds.
    pub diff: ClockTimeDiff,
    /// Running time of the observed buffer.
    pub timestamp: ClockTime,
}

impl QosEvent {
    /// Create a new QoS event.
    pub fn new(proportion: f64, diff: ClockTimeDiff, timestamp: ClockTime) -> Self {
        Self {
            proportion,
            diff,
            timestamp,
        }
    }

    /// Earliest running time worth processing, per this feedback.
    pub fn earliest_time(&self) -> ClockTime {
        self.timestamp.saturating_add_signed(self.diff)
    }
}

// ============================================================================
// QoS Messages
// ============================================================================

/// Report posted when a stage drops a late buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct QosMessage {
    /// Name of the stage that dropped the buffer.
    pub source: String,
    /// Running time of the dropped buffer.
    pub running_time: ClockTime,
    /// Stream time of the dropped buffer, if known.
    pub stream_time: Option<ClockTime>,
    /// Timestamp of the dropped buffer.
    pub timestamp: ClockTime,
    /// Duration of the dropped buffer, if known.
    pub duration: Option<ClockTime>,
    /// How late the buffer was relative to the earliest allowed time.
    pub jitter: ClockTimeDiff,
    /// Proportion from the most recent QoS feedback.
    pub proportion: f64,
    /// Buffers processed so far.
    pub processed: u64,
    /// Buffers dropped so far (including this one).
    pub dropped: u64,
}

/// Receiver of QoS drop reports (typically the pipeline bus).
pub trait QosObserver: Send + Sync {
    /// Called once per dropped buffer, outside the stage's object lock.
    /// [`Stage::should_drop`](crate::transform::Stage::should_drop) and
    /// [`Stage::qos_stats`](crate::transform::Stage::qos_stats) may be
    /// called from here.
    fn post_qos(&self, message: &QosMessage);
}
