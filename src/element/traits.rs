//! The hook trait implemented by concrete transforms.

use super::pad::PadDirection;
use super::peer::AllocationQuery;
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::format::{Caps, Structure};

// ============================================================================
// Transform Mode
// ============================================================================

/// Which processing hooks a transform provides.
///
/// The mode decides which dispatch paths are reachable:
///
/// | Mode | `transform_ip` | `transform` |
/// |---|---|---|
/// | `Passthrough` | no | no |
/// | `AlwaysInPlace` | yes | no |
/// | `NeverInPlace` | no | yes |
/// | `Both` | yes | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformMode {
    /// Pure observer: buffers always pass through unchanged.
    Passthrough,
    /// Only the in-place hook exists.
    AlwaysInPlace,
    /// Only the copying hook exists.
    NeverInPlace,
    /// Both hooks exist; in-place is used when input and output caps match.
    Both,
}

impl TransformMode {
    /// Whether `transform_ip` is implemented.
    #[inline]
    pub const fn has_transform_ip(self) -> bool {
        matches!(self, Self::AlwaysInPlace | Self::Both)
    }

    /// Whether `transform` is implemented.
    #[inline]
    pub const fn has_transform(self) -> bool {
        matches!(self, Self::NeverInPlace | Self::Both)
    }
}

// ============================================================================
// TransformImpl
// ============================================================================

/// Semantic hooks of a single-input/single-output transform.
///
/// A [`Stage`](crate::transform::Stage) owns one implementation and supplies
/// negotiation, allocation and dispatch around it. Every hook has a default;
/// a transform overrides the ones its [`MODE`](Self::MODE) needs.
///
/// Hooks take `&self` and are called without any stage lock held except the
/// stream lock, so implementations keep mutable settings behind their own
/// synchronization.
///
/// # Example
///
/// ```rust
/// use parallax_transform::prelude::*;
///
/// struct Invert;
///
/// impl TransformImpl for Invert {
///     const MODE: TransformMode = TransformMode::AlwaysInPlace;
///
///     fn transform_ip(&self, buffer: &mut Buffer) -> Result<()> {
///         let data = buffer
///             .data_mut()
///             .ok_or_else(|| Error::TransformFailed("buffer not writable".into()))?;
///         data.iter_mut().for_each(|b| *b = !*b);
///         Ok(())
///     }
/// }
/// ```
pub trait TransformImpl: Send + Sync + 'static {
    /// Which processing hooks exist.
    const MODE: TransformMode;

    /// Switch to passthrough whenever input and output caps are equal.
    const PASSTHROUGH_ON_SAME_CAPS: bool = false;

    /// Call [`transform_ip_passthrough`](Self::transform_ip_passthrough) on
    /// buffers flowing through in passthrough.
    const TRANSFORM_IP_ON_PASSTHROUGH: bool = true;

    /// Whether [`unit_size`](Self::unit_size) is meaningful. Without it the
    /// transform is size-invariant.
    const HAS_UNIT_SIZE: bool = false;

    /// Static superset of what the input pad can take.
    fn sink_template(&self) -> Caps {
        Caps::new_any()
    }

    /// Static superset of what the output pad can produce.
    fn src_template(&self) -> Caps {
        Caps::new_any()
    }

    /// Map caps on the `direction` pad to the caps possible on the other pad.
    ///
    /// The default maps every structure through
    /// [`transform_structure`](Self::transform_structure) and then restricts
    /// the result to `filter`, keeping the filter's preference order.
    fn transform_caps(&self, direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps {
        let mapped = if caps.is_any() {
            Caps::new_any()
        } else {
            caps.iter().fold(Caps::new_empty(), |acc, s| {
                acc.merge(Caps::from_structures(self.transform_structure(direction, s)))
            })
        };
        match filter {
            Some(filter) => filter.intersect(&mapped),
            None => mapped,
        }
    }

    /// Map one structure to zero or more structures on the other pad.
    fn transform_structure(&self, _direction: PadDirection, structure: &Structure) -> Vec<Structure> {
        vec![structure.clone()]
    }

    /// Narrow or enrich `candidate` given the fixed `reference` on the
    /// `direction` pad. Fields left open are fixated by the default policy.
    fn fixate_caps(&self, _direction: PadDirection, _reference: &Caps, candidate: Caps) -> Caps {
        candidate
    }

    /// Accept the negotiated input/output pair.
    fn set_caps(&self, _incaps: &Caps, _outcaps: &Caps) -> Result<()> {
        Ok(())
    }

    /// Bytes per unit (e.g. one audio frame) for fixed `caps`.
    fn unit_size(&self, _caps: &Caps) -> Option<usize> {
        None
    }

    /// Custom size mapping; `None` falls back to the unit-size ratio.
    fn transform_size(
        &self,
        _direction: PadDirection,
        _caps: &Caps,
        _size: usize,
        _othercaps: &Caps,
    ) -> Option<usize> {
        None
    }

    /// Inspect or edit downstream's allocation answer before a pool is chosen.
    fn decide_allocation(&self, _query: &mut AllocationQuery) -> Result<()> {
        Ok(())
    }

    /// Called for every buffer before the QoS check.
    fn before_transform(&self, _buffer: &Buffer) {}

    /// Carry metadata from input to a freshly allocated output.
    fn copy_metadata(&self, input: &Buffer, output: &mut Buffer) {
        output.metadata_mut().copy_from(input.metadata());
    }

    /// Modify a writable buffer in place.
    fn transform_ip(&self, _buffer: &mut Buffer) -> Result<()> {
        Err(Error::NotSupported("transform_ip"))
    }

    /// Observe a buffer flowing through in passthrough.
    fn transform_ip_passthrough(&self, _buffer: &Buffer) -> Result<()> {
        Ok(())
    }

    /// Produce `output` from `input`.
    fn transform(&self, _input: &Buffer, _output: &mut Buffer) -> Result<()> {
        Err(Error::NotSupported("transform"))
    }
}
