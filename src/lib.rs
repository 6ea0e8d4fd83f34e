//! # Parallax Transform
//!
//! The caps negotiation and buffer dispatch engine behind single-input,
//! single-output pipeline stages.
//!
//! A concrete transform implements [`TransformImpl`](element::TransformImpl)
//! with only its semantic hooks: how formats map across the stage, how big an
//! output buffer is, and how data is rewritten. Wrapping it in a
//! [`Stage`](transform::Stage) adds everything else:
//!
//! - **Negotiation**: fixed caps on either pad become fixed caps on the other,
//!   checked against templates and the linked neighbour
//! - **Processing mode**: passthrough, in-place or copy, decided per format
//! - **Output allocation**: downstream-proposed or local buffer pools with an
//!   ad hoc fallback
//! - **QoS**: late buffers are dropped and reported
//!
//! ## Features
//!
//! - **Typed formats**: [`Caps`](format::Caps) with ranges, lists and fractions
//! - **Pooled buffers**: bounded [`FixedBufferPool`](memory::FixedBufferPool)s
//!   with backpressure and flushing
//! - **Observability**: `tracing` spans and `metrics` counters per stage
//!
//! ## Quick Start
//!
//! ```rust
//! use parallax_transform::prelude::*;
//! use parallax_transform::elements::SampleFormat;
//!
//! let convert = Stage::new(AudioConvert::new(), StageConfig::default());
//! let volume = Stage::<Volume>::with_volume(0.5, StageConfig::default());
//! link(&convert, &volume);
//!
//! let caps = SampleFormat::S16Le.caps(48000, 1);
//! convert.negotiate(PadDirection::Input, &caps).unwrap();
//! volume.negotiate(PadDirection::Input, &convert.src_caps().unwrap()).unwrap();
//!
//! let samples: Vec<u8> = [1000i16, -1000].iter().flat_map(|s| s.to_le_bytes()).collect();
//! let out = convert.process(Buffer::from_vec(samples, Metadata::new())).unwrap().unwrap();
//! let out = volume.process(out).unwrap().unwrap();
//! assert_eq!(out.as_bytes(), &[0xf4, 0x01, 0x0c, 0xfe]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod clock;
pub mod element;
pub mod elements;
pub mod error;
pub mod event;
pub mod format;
pub mod memory;
pub mod metadata;
pub mod observability;
pub mod segment;
pub mod transform;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::clock::ClockTime;
    pub use crate::element::{PadDirection, PadPeer, TransformImpl, TransformMode};
    pub use crate::elements::{AudioConvert, CapsFilter, Identity, Volume};
    pub use crate::error::{Error, NegotiationError, Result};
    pub use crate::event::{Event, QosObserver, UpstreamEvent};
    pub use crate::format::{Caps, Structure, Value};
    pub use crate::memory::{BufferPool, FixedBufferPool, PoolConfig};
    pub use crate::metadata::Metadata;
    pub use crate::segment::Segment;
    pub use crate::transform::{Stage, StageConfig, link};
}

pub use error::{Error, NegotiationError, Result};
