//! Caps filter stage.

use crate::buffer::Buffer;
use crate::element::{PadDirection, TransformImpl, TransformMode};
use crate::error::Result;
use crate::format::Caps;
use crate::transform::Stage;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Restricts the formats that can flow through to a filter.
///
/// Input and output caps are always equal, so a negotiated caps filter runs
/// in passthrough. Changing the filter renegotiates at the next buffer.
///
/// # Example
///
/// ```rust
/// use parallax_transform::prelude::*;
///
/// let filter = Caps::builder("audio/x-raw").field("rate", 48000).build();
/// let stage = Stage::new(CapsFilter::new(filter), StageConfig::default());
///
/// let ok = Caps::builder("audio/x-raw").field("rate", 48000).build();
/// assert!(stage.negotiate(PadDirection::Input, &ok).is_ok());
///
/// let bad = Caps::builder("audio/x-raw").field("rate", 44100).build();
/// assert!(stage.negotiate(PadDirection::Input, &bad).is_err());
/// ```
pub struct CapsFilter {
    filter: Mutex<Caps>,
}

impl CapsFilter {
    /// Create a filter. `Caps::new_any()` lets everything through.
    pub fn new(filter: Caps) -> Self {
        Self {
            filter: Mutex::new(filter),
        }
    }

    /// The current filter.
    pub fn filter(&self) -> Caps {
        self.filter.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn replace(&self, filter: Caps) {
        *self.filter.lock().unwrap_or_else(PoisonError::into_inner) = filter;
    }
}

impl Default for CapsFilter {
    fn default() -> Self {
        Self::new(Caps::new_any())
    }
}

impl TransformImpl for CapsFilter {
    const MODE: TransformMode = TransformMode::AlwaysInPlace;
    const PASSTHROUGH_ON_SAME_CAPS: bool = true;

    fn transform_caps(&self, _direction: PadDirection, caps: &Caps, filter: Option<&Caps>) -> Caps {
        let allowed = caps.intersect(&self.filter());
        match filter {
            Some(filter) => filter.intersect(&allowed),
            None => allowed,
        }
    }

    fn transform_ip(&self, _buffer: &mut Buffer) -> Result<()> {
        Ok(())
    }
}

impl Stage<CapsFilter> {
    /// Replace the filter and renegotiate before the next buffer.
    pub fn set_filter(&self, filter: Caps) {
        debug!(stage = %self.name(), %filter, "caps filter changed");
        self.imp().replace(filter);
        self.reconfigure_src();
    }
}
