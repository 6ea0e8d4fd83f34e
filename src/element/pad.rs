//! Pads: the directional connection points of a stage.
//!
//! A pad carries a static template (the superset of formats it can ever
//! handle), the caps currently negotiated on it, and a weak link to the
//! neighbouring stage. Pad state sits behind its own `RwLock` so capability
//! queries never contend with the data path.

use super::peer::{PadPeer, PeerLink};
use crate::format::Caps;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Direction of a pad (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// An input pad (receives buffers from upstream).
    Input,
    /// An output pad (sends buffers downstream).
    Output,
}

impl PadDirection {
    /// The other direction.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

#[derive(Debug, Default)]
struct PadState {
    caps: Option<Caps>,
    peer: Option<PeerLink>,
    flushing: bool,
    needs_reconfigure: bool,
}

/// A pad instance on a stage.
#[derive(Debug)]
pub struct Pad {
    name: String,
    direction: PadDirection,
    template: Caps,
    state: RwLock<PadState>,
}

impl Pad {
    /// Create a new pad.
    pub fn new(name: impl Into<String>, direction: PadDirection, template: Caps) -> Self {
        Self {
            name: name.into(),
            direction,
            template,
            state: RwLock::new(PadState::default()),
        }
    }

    /// Create a standard input pad named "sink".
    pub fn sink(template: Caps) -> Self {
        Self::new("sink", PadDirection::Input, template)
    }

    /// Create a standard output pad named "src".
    pub fn src(template: Caps) -> Self {
        Self::new("src", PadDirection::Output, template)
    }

    fn read(&self) -> RwLockReadGuard<'_, PadState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PadState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the pad's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the pad's direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// The static template.
    pub fn template(&self) -> &Caps {
        &self.template
    }

    /// Currently negotiated caps.
    pub fn caps(&self) -> Option<Caps> {
        self.read().caps.clone()
    }

    /// Publish (or clear) the negotiated caps.
    pub fn set_caps(&self, caps: Option<Caps>) {
        self.write().caps = caps;
    }

    /// Link to a neighbour.
    pub fn set_peer(&self, link: PeerLink) {
        self.write().peer = Some(link);
    }

    /// Drop the link to the neighbour.
    pub fn unlink(&self) {
        self.write().peer = None;
    }

    /// The neighbour, if linked and still alive.
    pub fn peer(&self) -> Option<(Arc<dyn PadPeer>, PadDirection)> {
        self.read().peer.as_ref().and_then(PeerLink::upgrade)
    }

    /// Whether a live neighbour is linked.
    pub fn is_linked(&self) -> bool {
        self.peer().is_some()
    }

    /// Whether the pad is flushing.
    pub fn is_flushing(&self) -> bool {
        self.read().flushing
    }

    /// Enter or leave flushing.
    pub fn set_flushing(&self, flushing: bool) {
        self.write().flushing = flushing;
    }

    /// Request renegotiation at the next opportunity.
    pub fn mark_reconfigure(&self) {
        self.write().needs_reconfigure = true;
    }

    /// Whether a renegotiation is pending, without clearing it.
    pub fn needs_reconfigure(&self) -> bool {
        self.read().needs_reconfigure
    }

    /// Take the pending renegotiation request.
    pub fn check_reconfigure(&self) -> bool {
        std::mem::take(&mut self.write().needs_reconfigure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_creation() {
        let sink = Pad::sink(Caps::new_any());
        assert_eq!(sink.name(), "sink");
        assert_eq!(sink.direction(), PadDirection::Input);
        assert!(sink.caps().is_none());
        assert!(!sink.is_linked());

        let src = Pad::src(Caps::new_empty());
        assert_eq!(src.direction(), PadDirection::Output);
        assert!(src.template().is_empty());
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(PadDirection::Input.opposite(), PadDirection::Output);
        assert_eq!(PadDirection::Output.opposite(), PadDirection::Input);
    }

    #[test]
    fn test_reconfigure_flag_is_taken_once() {
        let pad = Pad::src(Caps::new_any());
        pad.mark_reconfigure();
        assert!(pad.needs_reconfigure());
        assert!(pad.check_reconfigure());
        assert!(!pad.check_reconfigure());
    }
}
