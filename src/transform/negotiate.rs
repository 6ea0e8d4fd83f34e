//! Caps negotiation and stage configuration.
//!
//! Negotiation is symmetric: fixed caps arriving on either pad are mapped
//! through the implementation, constrained by the other pad's template and
//! peer, fixated, checked with the peer, and finally used to configure the
//! stage.

use super::{NegotiatingGuard, ObjectState, Stage, StreamState, set_in_place_locked};
use crate::element::{PadDirection, PadPeer, TransformImpl, TransformMode};
use crate::error::{Error, NegotiationError, Result};
use crate::format::Caps;
use crate::observability::span_negotiation;
use std::sync::Arc;
use tracing::{debug, warn};

impl<T: TransformImpl> Stage<T> {
    /// Negotiate from fixed `caps` arriving on the `originating` pad.
    ///
    /// On success the originating pad carries `caps` and the other pad the
    /// chosen fixed caps. On failure the stage is left un-negotiated and the
    /// previously published caps stay on the pads.
    pub fn negotiate(&self, originating: PadDirection, caps: &Caps) -> std::result::Result<(), NegotiationError> {
        let mut stream = self.lock_stream();
        self.negotiate_locked(&mut stream, originating, caps).map(|_| ())
    }

    /// Returns `false` when negotiation was skipped because the peer is
    /// itself negotiating.
    pub(super) fn negotiate_locked(
        &self,
        stream: &mut StreamState,
        originating: PadDirection,
        caps: &Caps,
    ) -> std::result::Result<bool, NegotiationError> {
        if !caps.is_fixed() {
            return Err(NegotiationError::InvalidInput(format!(
                "caps {caps} are not fixed"
            )));
        }
        let _span = self
            .config
            .tracing
            .negotiation_spans
            .then(|| span_negotiation(&self.name, originating).entered());

        let other = self.pad(originating.opposite());
        let peer = other.peer();
        if let Some((p, pad)) = &peer {
            if p.is_negotiating(*pad) {
                debug!(stage = %self.name, "peer is negotiating, skipping");
                return Ok(false);
            }
        }
        let _negotiating = NegotiatingGuard::enter(&self.negotiating);

        let result = self
            .find_transform(originating, caps, peer.as_ref())
            .and_then(|candidate| {
                let (incaps, outcaps) = match originating {
                    PadDirection::Input => (caps.clone(), candidate.clone()),
                    PadDirection::Output => (candidate.clone(), caps.clone()),
                };
                let delay = self.lock_state().delay_configure;
                if delay {
                    debug!(stage = %self.name, "delaying configure to the next buffer");
                    self.lock_state().pending_configure = true;
                } else {
                    self.configure(stream, &incaps, &outcaps)?;
                }
                Ok(candidate)
            });

        match result {
            Ok(candidate) => {
                debug!(stage = %self.name, direction = ?originating, %caps, %candidate, "negotiated");
                self.pad(originating).set_caps(Some(caps.clone()));
                other.set_caps(Some(candidate));
                self.lock_state().negotiated = true;
                self.metrics.record_negotiation(true);
                Ok(true)
            }
            Err(e) => {
                warn!(stage = %self.name, direction = ?originating, %caps, error = %e, "negotiation failed");
                self.lock_state().negotiated = false;
                self.metrics.record_negotiation(false);
                Err(e)
            }
        }
    }

    /// Steps from the incoming caps to a fixed, peer-approved candidate.
    fn find_transform(
        &self,
        originating: PadDirection,
        caps: &Caps,
        peer: Option<&(Arc<dyn PadPeer>, PadDirection)>,
    ) -> std::result::Result<Caps, NegotiationError> {
        let other = self.pad(originating.opposite());
        let no_transform = || NegotiationError::NoTransformPossible {
            direction: originating,
            caps: caps.to_string(),
        };

        let mut candidate = self
            .imp
            .transform_caps(originating, caps, None)
            .intersect(other.template());
        debug!(stage = %self.name, %candidate, "transformed caps");
        if candidate.is_empty() {
            return Err(no_transform());
        }

        let mut peer_checked = false;
        if !candidate.is_fixed() {
            let passthrough_ok = candidate.can_intersect(caps)
                && peer.is_none_or(|(p, pad)| p.accept_caps(*pad, caps));
            if passthrough_ok {
                debug!(stage = %self.name, "peer accepts the input caps unchanged");
                candidate = caps.clone();
                peer_checked = true;
            } else if let Some((p, pad)) = peer {
                let peercaps = p.query_caps(*pad, Some(&candidate));
                candidate = peercaps.intersect(&candidate);
                debug!(stage = %self.name, %peercaps, %candidate, "constrained by peer");
            }
        }
        if candidate.is_empty() {
            return Err(no_transform());
        }

        if candidate.is_fixed() {
            let enriched = self.imp.fixate_caps(originating, caps, candidate.clone());
            if enriched.is_fixed() && !enriched.is_equal(&candidate) {
                debug!(stage = %self.name, %enriched, "fixate hook enriched caps");
                candidate = enriched;
                peer_checked = false;
            }
        } else {
            candidate = self.imp.fixate_caps(originating, caps, candidate.truncate());
            if !candidate.is_fixed() {
                candidate = candidate.fixate_nearest(caps);
            }
            peer_checked = false;
        }
        if !candidate.is_fixed() {
            return Err(NegotiationError::CouldNotFixate {
                caps: candidate.to_string(),
            });
        }

        if !peer_checked {
            if let Some((p, pad)) = peer {
                if !p.accept_caps(*pad, &candidate) {
                    return Err(NegotiationError::PeerRejected {
                        caps: candidate.to_string(),
                    });
                }
            }
        }
        Ok(candidate)
    }

    /// Apply a negotiated input/output pair.
    ///
    /// If the implementation refuses the pair, the passthrough and in-place
    /// flags revert to their values from before this call.
    pub(super) fn configure(
        &self,
        stream: &mut StreamState,
        incaps: &Caps,
        outcaps: &Caps,
    ) -> std::result::Result<(), NegotiationError> {
        let (previous, passthrough, in_place) = {
            let mut st = self.lock_state();
            let previous = (st.passthrough, st.in_place, st.have_same_caps);
            st.cache.clear();
            st.pending_configure = false;
            st.have_same_caps = incaps.is_equal(outcaps);
            let same = st.have_same_caps;
            set_in_place_locked::<T>(&mut st, same);
            if T::PASSTHROUGH_ON_SAME_CAPS {
                st.passthrough = same;
            }
            if T::MODE == TransformMode::Passthrough {
                st.passthrough = true;
            }
            debug!(
                stage = %self.name,
                %incaps,
                %outcaps,
                same_caps = same,
                passthrough = st.passthrough,
                in_place = st.in_place,
                "configuring"
            );
            (previous, st.passthrough, st.in_place)
        };

        let restore = |st: &mut ObjectState| {
            (st.passthrough, st.in_place, st.have_same_caps) = previous;
        };
        let failed = |e: Error| NegotiationError::ConfigureFailed {
            reason: e.to_string(),
        };

        if let Err(e) = self.imp.set_caps(incaps, outcaps) {
            restore(&mut *self.lock_state());
            return Err(failed(e));
        }

        if passthrough || in_place {
            self.clear_allocation(stream);
        } else if let Err(e) = self.bind_output_allocator(stream, outcaps) {
            restore(&mut *self.lock_state());
            return Err(failed(e));
        }
        Ok(())
    }

    /// Run a deferred configure with the caps currently on the pads.
    pub(super) fn apply_pending_configure(&self, stream: &mut StreamState) -> Result<()> {
        let (Some(incaps), Some(outcaps)) = (self.sink.caps(), self.src.caps()) else {
            return Err(Error::NotNegotiated);
        };
        if let Err(e) = self.configure(stream, &incaps, &outcaps) {
            self.lock_state().negotiated = false;
            return Err(e.into());
        }
        Ok(())
    }

    /// Caps the `direction` pad can handle right now, given its neighbour.
    ///
    /// Only takes the object lock; never waits for the data path.
    pub fn query_caps(&self, direction: PadDirection, filter: Option<&Caps>) -> Caps {
        let pad = self.pad(direction);
        let other = self.pad(direction.opposite());
        let templ = pad.template();
        let otempl = other.template();

        let (prefer_passthrough, suggestion) = {
            let st = self.lock_state();
            (st.prefer_passthrough, st.suggestion.clone())
        };

        let peerfilter = filter.map(|f| self.imp.transform_caps(direction, f, None).intersect(otempl));
        // An unlinked pad answers with the filter, or with ANY.
        let peercaps = match other.peer() {
            Some((p, peer_pad)) => p.query_caps(peer_pad, peerfilter.as_ref()),
            None => peerfilter.unwrap_or_else(Caps::new_any),
        };

        let allowed = peercaps.intersect(otempl);
        let mapped = self
            .imp
            .transform_caps(direction.opposite(), &allowed, None)
            .intersect(templ);
        let mut caps = if prefer_passthrough {
            allowed.intersect(templ).merge(mapped)
        } else {
            mapped
        };

        if direction == PadDirection::Input {
            if let Some(suggestion) = suggestion {
                caps = suggestion.intersect(&caps).merge(caps);
            }
        }
        if let Some(filter) = filter {
            caps = filter.intersect(&caps);
        }
        caps
    }

    /// Whether the `direction` pad would take `caps` right now.
    pub fn accept_caps(&self, direction: PadDirection, caps: &Caps) -> bool {
        let allowed = self.query_caps(direction, Some(caps));
        let accepted = if caps.is_fixed() {
            caps.is_subset(&allowed)
        } else {
            caps.can_intersect(&allowed)
        };
        debug!(stage = %self.name, direction = ?direction, %caps, accepted, "accept caps");
        accepted
    }
}
