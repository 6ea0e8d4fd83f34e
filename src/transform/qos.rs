//! Quality-of-service governor.
//!
//! Downstream reports lateness as `(proportion, diff, timestamp)`. The stage
//! remembers `earliest = timestamp + diff` and drops any buffer whose running
//! time is not past it, since it would arrive too late to be useful.

use super::{Stage, StreamState};
use crate::buffer::Buffer;
use crate::clock::{ClockTime, ClockTimeDiff};
use crate::element::TransformImpl;
use crate::event::QosMessage;
use crate::segment::Segment;
use std::sync::PoisonError;
use tracing::{debug, trace};

#[derive(Debug)]
pub(super) struct QosState {
    enabled: bool,
    proportion: f64,
    earliest_time: Option<ClockTime>,
    pub(super) processed: u64,
    dropped: u64,
    /// Copy of the stream segment, readable without the stream lock.
    pub(super) segment: Segment,
}

impl QosState {
    pub(super) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            proportion: 1.0,
            earliest_time: None,
            processed: 0,
            dropped: 0,
            segment: Segment::default(),
        }
    }

    /// Forget feedback; counters survive.
    pub(super) fn reset(&mut self) {
        self.proportion = 1.0;
        self.earliest_time = None;
    }

    fn is_late(&self, running_time: ClockTime) -> bool {
        self.enabled && self.earliest_time.is_some_and(|earliest| running_time <= earliest)
    }
}

/// Snapshot of a stage's QoS state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QosStats {
    /// Whether late buffers are dropped.
    pub enabled: bool,
    /// Proportion from the latest feedback.
    pub proportion: f64,
    /// Buffers with a running time up to this are dropped.
    pub earliest_time: Option<ClockTime>,
    /// Buffers that went through a dispatch path.
    pub processed: u64,
    /// Buffers dropped as late.
    pub dropped: u64,
}

impl<T: TransformImpl> Stage<T> {
    /// Record downstream lateness feedback.
    pub fn update_qos(&self, proportion: f64, diff: ClockTimeDiff, timestamp: ClockTime) {
        let earliest = timestamp.saturating_add_signed(diff);
        trace!(stage = %self.name, proportion, diff, %timestamp, %earliest, "qos update");
        let mut st = self.lock_state();
        st.qos.proportion = proportion;
        st.qos.earliest_time = Some(earliest);
    }

    /// Turn late-buffer dropping on or off.
    pub fn set_qos_enabled(&self, enabled: bool) {
        self.lock_state().qos.enabled = enabled;
    }

    /// Whether late-buffer dropping is on.
    pub fn is_qos_enabled(&self) -> bool {
        self.lock_state().qos.enabled
    }

    /// Current QoS state.
    pub fn qos_stats(&self) -> QosStats {
        let st = self.lock_state();
        QosStats {
            enabled: st.qos.enabled,
            proportion: st.qos.proportion,
            earliest_time: st.qos.earliest_time,
            processed: st.qos.processed,
            dropped: st.qos.dropped,
        }
    }

    /// Whether `buffer` would be dropped as late right now.
    ///
    /// Only buffers with a timestamp in a time segment are ever dropped.
    /// Takes only the object lock, so it may be called from
    /// [`TransformImpl::before_transform`] or a [`QosObserver`] while a
    /// buffer is being processed.
    ///
    /// [`QosObserver`]: crate::event::QosObserver
    pub fn should_drop(&self, buffer: &Buffer) -> bool {
        let st = self.lock_state();
        running_time(&st.qos.segment, buffer).is_some_and(|rt| st.qos.is_late(rt))
    }

    /// Drop check on the data path. Counts the drop and reports it.
    pub(super) fn check_qos(&self, stream: &StreamState, buffer: &Buffer) -> bool {
        let (Some(pts), Some(running_time)) = (buffer.metadata().pts, running_time(&stream.segment, buffer))
        else {
            return false;
        };
        let message = {
            let mut st = self.lock_state();
            if !st.qos.is_late(running_time) {
                return false;
            }
            let Some(earliest) = st.qos.earliest_time else {
                return false;
            };
            st.qos.dropped += 1;
            st.discont_pending = true;
            QosMessage {
                source: self.name.clone(),
                running_time,
                stream_time: stream.segment.to_stream_time(pts),
                timestamp: pts,
                duration: buffer.metadata().duration,
                jitter: earliest.diff(running_time),
                proportion: st.qos.proportion,
                processed: st.qos.processed,
                dropped: st.qos.dropped,
            }
        };

        debug!(
            stage = %self.name,
            %running_time,
            jitter = message.jitter,
            dropped = message.dropped,
            "dropping late buffer"
        );
        self.metrics.record_dropped();

        let observer = self.observer.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(observer) = observer {
            observer.post_qos(&message);
        }
        true
    }
}

fn running_time(segment: &Segment, buffer: &Buffer) -> Option<ClockTime> {
    if !segment.is_time() {
        return None;
    }
    segment.to_running_time(buffer.metadata().pts?)
}
