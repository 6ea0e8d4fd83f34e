//! Audio sample format conversion stage.
//!
//! Converts interleaved `audio/x-raw` between S16LE and F32LE. Rate and
//! channel count pass through unchanged, so the output size follows from the
//! unit sizes of both formats.

use crate::buffer::Buffer;
use crate::element::{PadDirection, TransformImpl, TransformMode};
use crate::error::{Error, Result};
use crate::format::{Caps, Structure, Value};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Media type of raw audio.
pub const AUDIO_RAW: &str = "audio/x-raw";

/// Supported sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian.
    S16Le,
    /// 32-bit float little-endian, nominal range [-1.0, 1.0].
    F32Le,
}

impl SampleFormat {
    /// Every supported format, in preference order.
    pub const ALL: [SampleFormat; 2] = [SampleFormat::S16Le, SampleFormat::F32Le];

    /// Caps name of the format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S16Le => "S16LE",
            Self::F32Le => "F32LE",
        }
    }

    /// Parse a caps format name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// Format of a fixed audio structure.
    pub fn from_structure(s: &Structure) -> Option<Self> {
        s.get_str("format").and_then(Self::from_name)
    }

    /// Bytes per sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16Le => 2,
            Self::F32Le => 4,
        }
    }

    /// Fixed caps for this format.
    pub fn caps(self, rate: i32, channels: i32) -> Caps {
        Caps::builder(AUDIO_RAW)
            .field("format", self.as_str())
            .field("rate", rate)
            .field("channels", channels)
            .build()
    }
}

/// Template shared by the audio stages: both formats, any rate and layout.
pub fn audio_template() -> Caps {
    Caps::builder(AUDIO_RAW)
        .field("format", Value::list(SampleFormat::ALL.map(SampleFormat::as_str)))
        .field("rate", 1..=i32::MAX)
        .field("channels", 1..=64i32)
        .build()
}

/// Bytes per frame of fixed audio caps.
pub(crate) fn frame_size(caps: &Caps) -> Option<usize> {
    let s = caps.structure(0)?;
    let format = SampleFormat::from_structure(s)?;
    let channels = usize::try_from(s.get_int("channels")?).ok()?;
    Some(channels * format.bytes_per_sample())
}

/// Converts audio samples between S16LE and F32LE.
///
/// Equal input and output caps make the stage passthrough.
///
/// # Example
///
/// ```rust
/// use parallax_transform::prelude::*;
/// use parallax_transform::elements::SampleFormat;
///
/// let stage = Stage::new(AudioConvert::new(), StageConfig::default());
/// let s16 = SampleFormat::S16Le.caps(48000, 2);
/// let f32 = SampleFormat::F32Le.caps(48000, 2);
///
/// stage.negotiate(PadDirection::Input, &s16).unwrap();
/// assert!(stage.is_passthrough());
///
/// // 10 stereo S16 frames become 10 stereo F32 frames.
/// assert_eq!(stage.transform_size(PadDirection::Input, &s16, 40, &f32).unwrap(), 80);
/// ```
#[derive(Debug, Default)]
pub struct AudioConvert {
    conversion: Mutex<Option<(SampleFormat, SampleFormat)>>,
}

impl AudioConvert {
    /// Create an unconfigured converter.
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured `(input, output)` formats.
    pub fn conversion(&self) -> Option<(SampleFormat, SampleFormat)> {
        *self.conversion.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransformImpl for AudioConvert {
    const MODE: TransformMode = TransformMode::NeverInPlace;
    const PASSTHROUGH_ON_SAME_CAPS: bool = true;
    const HAS_UNIT_SIZE: bool = true;

    fn sink_template(&self) -> Caps {
        audio_template()
    }

    fn src_template(&self) -> Caps {
        audio_template()
    }

    fn transform_structure(&self, _direction: PadDirection, s: &Structure) -> Vec<Structure> {
        let formats: Vec<&str> = match SampleFormat::from_structure(s) {
            Some(own) => std::iter::once(own)
                .chain(SampleFormat::ALL.into_iter().filter(|f| *f != own))
                .map(SampleFormat::as_str)
                .collect(),
            None => SampleFormat::ALL.map(SampleFormat::as_str).to_vec(),
        };
        let mut out = s.clone();
        out.set("format", Value::list(formats));
        vec![out]
    }

    fn set_caps(&self, incaps: &Caps, outcaps: &Caps) -> Result<()> {
        let format = |caps: &Caps| {
            caps.structure(0)
                .and_then(SampleFormat::from_structure)
                .ok_or_else(|| Error::InvalidInput(format!("unsupported audio caps {caps}")))
        };
        let (from, to) = (format(incaps)?, format(outcaps)?);
        debug!(from = from.as_str(), to = to.as_str(), "audio conversion configured");
        *self.conversion.lock().unwrap_or_else(PoisonError::into_inner) = Some((from, to));
        Ok(())
    }

    fn unit_size(&self, caps: &Caps) -> Option<usize> {
        frame_size(caps)
    }

    fn transform(&self, input: &Buffer, output: &mut Buffer) -> Result<()> {
        let (from, to) = self.conversion().ok_or(Error::NotNegotiated)?;
        let samples = input.len() / from.bytes_per_sample();
        if output.len() != samples * to.bytes_per_sample() {
            return Err(Error::TransformFailed(format!(
                "output holds {} bytes, need {}",
                output.len(),
                samples * to.bytes_per_sample()
            )));
        }
        let src = input.as_bytes();
        let dst = output
            .data_mut()
            .ok_or_else(|| Error::TransformFailed("output buffer not writable".into()))?;

        match (from, to) {
            (SampleFormat::S16Le, SampleFormat::F32Le) => {
                for (i, o) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                    let v = i16::from_le_bytes([i[0], i[1]]) as f32 / 32768.0;
                    o.copy_from_slice(&v.to_le_bytes());
                }
            }
            (SampleFormat::F32Le, SampleFormat::S16Le) => {
                for (i, o) in src.chunks_exact(4).zip(dst.chunks_exact_mut(2)) {
                    let v = f32::from_le_bytes([i[0], i[1], i[2], i[3]]);
                    let s = (v.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                    o.copy_from_slice(&s.to_le_bytes());
                }
            }
            _ => dst.copy_from_slice(&src[..dst.len()]),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::transform::{Stage, StageConfig};

    fn s16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn f32_samples(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn test_unit_size_from_caps() {
        let convert = AudioConvert::new();
        assert_eq!(convert.unit_size(&SampleFormat::S16Le.caps(48000, 2)), Some(4));
        assert_eq!(convert.unit_size(&SampleFormat::F32Le.caps(48000, 6)), Some(24));
        assert_eq!(convert.unit_size(&Caps::builder(AUDIO_RAW).build()), None);
    }

    #[test]
    fn test_transform_structure_offers_both_formats() {
        let convert = AudioConvert::new();
        let caps = SampleFormat::F32Le.caps(44100, 1);
        let out = convert.transform_caps(PadDirection::Input, &caps, None);
        let s = out.structure(0).unwrap();
        assert_eq!(s.get("format"), Some(&Value::list(["F32LE", "S16LE"])));
        assert_eq!(s.get_int("rate"), Some(44100));
    }

    #[test]
    fn test_s16_to_f32_conversion() {
        let convert = AudioConvert::new();
        convert
            .set_caps(&SampleFormat::S16Le.caps(48000, 1), &SampleFormat::F32Le.caps(48000, 1))
            .unwrap();

        // Silence, max positive, max negative
        let input = Buffer::from_vec(s16_bytes(&[0, 32767, -32768]), Metadata::new());
        let mut output = Buffer::allocate(12).unwrap();
        convert.transform(&input, &mut output).unwrap();

        let out = f32_samples(output.as_bytes());
        assert!((out[0] - 0.0).abs() < 0.001, "Silence should be ~0.0, got {}", out[0]);
        assert!((out[1] - 1.0).abs() < 0.001, "Max positive should be ~1.0, got {}", out[1]);
        assert!((out[2] + 1.0).abs() < 0.001, "Max negative should be ~-1.0, got {}", out[2]);
    }

    #[test]
    fn test_f32_to_s16_clamps() {
        let convert = AudioConvert::new();
        convert
            .set_caps(&SampleFormat::F32Le.caps(48000, 1), &SampleFormat::S16Le.caps(48000, 1))
            .unwrap();

        let input: Vec<u8> = [-2.0f32, 0.0, 0.5, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let input = Buffer::from_vec(input, Metadata::new());
        let mut output = Buffer::allocate(8).unwrap();
        convert.transform(&input, &mut output).unwrap();

        let out: Vec<i16> = output
            .as_bytes()
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(out, vec![-32767, 0, 16384, 32767]);
    }

    #[test]
    fn test_output_size_checked() {
        let convert = AudioConvert::new();
        convert
            .set_caps(&SampleFormat::S16Le.caps(48000, 1), &SampleFormat::F32Le.caps(48000, 1))
            .unwrap();
        let input = Buffer::from_vec(s16_bytes(&[1, 2]), Metadata::new());
        let mut output = Buffer::allocate(4).unwrap();
        assert!(matches!(
            convert.transform(&input, &mut output),
            Err(Error::TransformFailed(_))
        ));
    }

    #[test]
    fn test_unconfigured_transform_fails() {
        let convert = AudioConvert::new();
        let input = Buffer::from_vec(s16_bytes(&[1]), Metadata::new());
        let mut output = Buffer::allocate(4).unwrap();
        assert!(matches!(
            convert.transform(&input, &mut output),
            Err(Error::NotNegotiated)
        ));
    }

    #[test]
    fn test_same_format_is_passthrough() {
        let stage = Stage::new(AudioConvert::new(), StageConfig::default());
        let caps = SampleFormat::S16Le.caps(48000, 2);
        stage.negotiate(PadDirection::Input, &caps).unwrap();
        assert!(stage.is_passthrough());
        assert!(!stage.allocation().is_bound());
        assert_eq!(stage.imp().conversion(), Some((SampleFormat::S16Le, SampleFormat::S16Le)));
    }
}
