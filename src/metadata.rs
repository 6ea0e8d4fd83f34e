//! Buffer metadata types.

use crate::clock::ClockTime;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer does not continue the previous one (after a drop, flush or seek).
    pub discont: bool,
    /// Buffer stands in for missing data; its contents are not meaningful.
    pub gap: bool,
    /// Buffer was captured from a live source.
    pub live: bool,
    /// Buffer is corrupted or incomplete.
    pub corrupted: bool,
    /// Buffer cannot be decoded on its own.
    pub delta_unit: bool,
    /// Buffer may be dropped without harm.
    pub droppable: bool,
}

impl BufferFlags {
    /// Set the discont flag.
    pub fn set_discont(&mut self, value: bool) {
        self.discont = value;
    }

    /// Check if discont flag is set.
    pub fn is_discont(&self) -> bool {
        self.discont
    }

    /// Set the gap flag.
    pub fn set_gap(&mut self, value: bool) {
        self.gap = value;
    }

    /// Check if gap flag is set.
    pub fn is_gap(&self) -> bool {
        self.gap
    }
}

/// Metadata associated with a buffer.
///
/// Timestamps are unset (`None`) unless the producer knows them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Presentation timestamp.
    pub pts: Option<ClockTime>,

    /// Decode timestamp.
    pub dts: Option<ClockTime>,

    /// Duration of this buffer's content.
    pub duration: Option<ClockTime>,

    /// Media-specific offset (e.g. first sample index).
    pub offset: Option<u64>,

    /// Media-specific end offset.
    pub offset_end: Option<u64>,

    /// Monotonic sequence number within a stream.
    pub sequence: u64,

    /// Buffer flags.
    pub flags: BufferFlags,
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: ClockTime) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the offsets.
    pub fn with_offsets(mut self, offset: u64, offset_end: u64) -> Self {
        self.offset = Some(offset);
        self.offset_end = Some(offset_end);
        self
    }

    /// Mark as a gap.
    pub fn with_gap(mut self) -> Self {
        self.flags.gap = true;
        self
    }

    /// Mark as discontinuous.
    pub fn with_discont(mut self) -> Self {
        self.flags.discont = true;
        self
    }

    /// Copy timestamps, offsets, sequence and flags from `other`.
    pub fn copy_from(&mut self, other: &Metadata) {
        self.clone_from(other);
    }
}
