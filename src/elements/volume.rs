//! Volume stage.

use super::audioconvert::{SampleFormat, audio_template};
use crate::buffer::Buffer;
use crate::element::{TransformImpl, TransformMode};
use crate::error::{Error, Result};
use crate::format::Caps;
use crate::transform::{Stage, StageConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Scales S16LE or F32LE samples in place by a linear gain.
///
/// A gain of exactly 1.0 puts the stage into passthrough.
///
/// # Example
///
/// ```rust
/// use parallax_transform::prelude::*;
///
/// let stage = Stage::<Volume>::with_volume(0.5, StageConfig::default());
/// assert!(!stage.is_passthrough());
///
/// stage.set_volume(1.0);
/// assert!(stage.is_passthrough());
/// ```
#[derive(Debug)]
pub struct Volume {
    gain: AtomicU64,
    format: Mutex<Option<SampleFormat>>,
}

impl Volume {
    /// Create a volume transform with `gain`. Negative gains clamp to 0.
    pub fn new(gain: f64) -> Self {
        Self {
            gain: AtomicU64::new(gain.max(0.0).to_bits()),
            format: Mutex::new(None),
        }
    }

    /// The current gain.
    pub fn gain(&self) -> f64 {
        f64::from_bits(self.gain.load(Ordering::Relaxed))
    }

    fn set_gain(&self, gain: f64) {
        self.gain.store(gain.max(0.0).to_bits(), Ordering::Relaxed);
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl TransformImpl for Volume {
    const MODE: TransformMode = TransformMode::AlwaysInPlace;

    fn sink_template(&self) -> Caps {
        audio_template()
    }

    fn src_template(&self) -> Caps {
        audio_template()
    }

    fn set_caps(&self, incaps: &Caps, _outcaps: &Caps) -> Result<()> {
        let format = incaps
            .structure(0)
            .and_then(SampleFormat::from_structure)
            .ok_or_else(|| Error::InvalidInput(format!("unsupported audio caps {incaps}")))?;
        *self.format.lock().unwrap_or_else(PoisonError::into_inner) = Some(format);
        Ok(())
    }

    fn transform_ip(&self, buffer: &mut Buffer) -> Result<()> {
        let format = self
            .format
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or(Error::NotNegotiated)?;
        let gain = self.gain();
        let data = buffer
            .data_mut()
            .ok_or_else(|| Error::TransformFailed("buffer not writable".into()))?;

        match format {
            SampleFormat::S16Le => {
                for s in data.chunks_exact_mut(2) {
                    let v = i16::from_le_bytes([s[0], s[1]]) as f64 * gain;
                    let v = v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
                    s.copy_from_slice(&v.to_le_bytes());
                }
            }
            SampleFormat::F32Le => {
                let gain = gain as f32;
                for s in data.chunks_exact_mut(4) {
                    let v = f32::from_le_bytes([s[0], s[1], s[2], s[3]]) * gain;
                    s.copy_from_slice(&v.to_le_bytes());
                }
            }
        }
        Ok(())
    }
}

impl Stage<Volume> {
    /// Create a volume stage, in passthrough if `gain` is unity.
    pub fn with_volume(gain: f64, config: StageConfig) -> Arc<Self> {
        let stage = Stage::new(Volume::new(gain), config);
        stage.set_volume(gain);
        stage
    }

    /// Change the gain. Unity gain switches to passthrough.
    pub fn set_volume(&self, gain: f64) {
        debug!(stage = %self.name(), gain, "volume changed");
        self.imp().set_gain(gain);
        self.set_passthrough(self.imp().gain() == 1.0);
    }
}
