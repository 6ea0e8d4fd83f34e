//! The transform engine.
//!
//! A [`Stage`] wraps a [`TransformImpl`] with one sink and one source pad
//! and supplies everything around the semantic hooks:
//!
//! - **Negotiation**: turns fixed caps arriving on either pad into fixed caps
//!   for the other pad, then configures the stage
//! - **Unit-size cache**: two identity-keyed slots memoizing `unit_size`
//! - **Allocator binding**: picks the output pool for the negotiated format
//! - **Dispatch**: routes each buffer through passthrough, in-place or copy
//! - **QoS**: drops buffers that would arrive too late
//!
//! # Locking
//!
//! Two mutexes, always taken in this order:
//!
//! 1. the *stream lock* (`StreamState`), held across `negotiate`,
//!    `configure` and the whole of `process`
//! 2. the *object lock* (`ObjectState`), guarding flags, the cache and QoS
//!    state; never held while calling a peer or a hook
//!
//! Caps and accept queries only take the object lock, so they never wait on
//! the data path.
//!
//! # Example
//!
//! ```rust
//! use parallax_transform::prelude::*;
//!
//! let stage = Stage::new(Identity::new(), StageConfig::default());
//! let caps = Caps::builder("audio/x-raw").field("rate", 48000).build();
//!
//! stage.negotiate(PadDirection::Input, &caps).unwrap();
//! assert!(stage.is_passthrough());
//!
//! let out = stage.process(Buffer::from_slice(&[1, 2, 3], Metadata::new())).unwrap();
//! assert_eq!(out.unwrap().as_bytes(), &[1, 2, 3]);
//! ```

mod allocation;
mod config;
mod dispatch;
mod negotiate;
mod qos;
mod size;

pub use allocation::{AllocationBinding, PoolSource};
pub use config::StageConfig;
pub use qos::QosStats;

use crate::element::{
    AllocationQuery, Pad, PadDirection, PadPeer, PeerLink, TransformImpl, TransformMode,
};
use crate::error::Result;
use crate::event::{Event, QosObserver, UpstreamEvent};
use crate::format::Caps;
use crate::memory::BufferPool;
use crate::observability::StageMetrics;
use crate::segment::Segment;
use qos::QosState;
use size::UnitSizeCache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Data-path state, guarded by the stream lock.
struct StreamState {
    binding: AllocationBinding,
    segment: Segment,
}

/// Flags, cache and QoS, guarded by the object lock.
struct ObjectState {
    passthrough: bool,
    in_place: bool,
    negotiated: bool,
    delay_configure: bool,
    pending_configure: bool,
    prefer_passthrough: bool,
    gap_aware: bool,
    have_same_caps: bool,
    discont_pending: bool,
    cache: UnitSizeCache,
    qos: QosState,
    /// Clone of the bound pool so flushing can reach it without the stream lock.
    active_pool: Option<Arc<dyn BufferPool>>,
    suggestion: Option<Caps>,
    suggested_size: Option<usize>,
}

/// A single-input/single-output transform stage.
pub struct Stage<T: TransformImpl> {
    name: String,
    imp: T,
    sink: Pad,
    src: Pad,
    config: StageConfig,
    stream: Mutex<StreamState>,
    state: Mutex<ObjectState>,
    negotiating: AtomicBool,
    observer: Mutex<Option<Arc<dyn QosObserver>>>,
    metrics: StageMetrics,
}

impl<T: TransformImpl> Stage<T> {
    /// Create a stage around `imp`.
    pub fn new(imp: T, config: StageConfig) -> Arc<Self> {
        let name = config.name.clone().unwrap_or_else(|| default_name::<T>());
        let sink = Pad::sink(imp.sink_template());
        let src = Pad::src(imp.src_template());
        let state = ObjectState {
            passthrough: T::MODE == TransformMode::Passthrough,
            in_place: T::MODE == TransformMode::AlwaysInPlace,
            negotiated: false,
            delay_configure: config.delay_configure,
            pending_configure: false,
            prefer_passthrough: config.prefer_passthrough,
            gap_aware: config.gap_aware,
            have_same_caps: false,
            discont_pending: false,
            cache: UnitSizeCache::default(),
            qos: QosState::new(config.qos),
            active_pool: None,
            suggestion: None,
            suggested_size: None,
        };
        debug!(stage = %name, mode = ?T::MODE, "created stage");
        Arc::new(Self {
            metrics: StageMetrics::new(&name),
            name,
            imp,
            sink,
            src,
            config,
            stream: Mutex::new(StreamState {
                binding: AllocationBinding::default(),
                segment: Segment::default(),
            }),
            state: Mutex::new(state),
            negotiating: AtomicBool::new(false),
            observer: Mutex::new(None),
        })
    }

    fn lock_stream(&self) -> MutexGuard<'_, StreamState> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pad(&self, direction: PadDirection) -> &Pad {
        match direction {
            PadDirection::Input => &self.sink,
            PadDirection::Output => &self.src,
        }
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped implementation.
    pub fn imp(&self) -> &T {
        &self.imp
    }

    /// The input pad.
    pub fn sink_pad(&self) -> &Pad {
        &self.sink
    }

    /// The output pad.
    pub fn src_pad(&self) -> &Pad {
        &self.src
    }

    /// Caps negotiated on the input pad.
    pub fn sink_caps(&self) -> Option<Caps> {
        self.sink.caps()
    }

    /// Caps negotiated on the output pad.
    pub fn src_caps(&self) -> Option<Caps> {
        self.src.caps()
    }

    /// Link the input pad to `pad` on an upstream neighbour.
    pub fn set_sink_peer(&self, peer: &Arc<dyn PadPeer>, pad: PadDirection) {
        self.sink.set_peer(PeerLink::new(peer, pad));
    }

    /// Link the output pad to `pad` on a downstream neighbour.
    pub fn set_src_peer(&self, peer: &Arc<dyn PadPeer>, pad: PadDirection) {
        self.src.set_peer(PeerLink::new(peer, pad));
    }

    /// Install the receiver of QoS drop reports.
    pub fn set_qos_observer(&self, observer: Arc<dyn QosObserver>) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Whether the last negotiation succeeded.
    pub fn is_negotiated(&self) -> bool {
        self.lock_state().negotiated
    }

    /// Whether buffers currently pass through untouched.
    pub fn is_passthrough(&self) -> bool {
        self.lock_state().passthrough
    }

    /// Force passthrough on or off.
    ///
    /// Passthrough cannot be disabled for [`TransformMode::Passthrough`]
    /// transforms. A change renegotiates at the next buffer so the output
    /// allocation follows.
    pub fn set_passthrough(&self, passthrough: bool) {
        let changed = {
            let mut st = self.lock_state();
            let old = st.passthrough;
            st.passthrough = passthrough || T::MODE == TransformMode::Passthrough;
            old != st.passthrough
        };
        if changed {
            debug!(stage = %self.name, passthrough, "passthrough changed");
            self.src.mark_reconfigure();
        }
    }

    /// Whether buffers are modified in place.
    pub fn is_in_place(&self) -> bool {
        self.lock_state().in_place
    }

    /// Request in-place processing on or off.
    ///
    /// Enabling only takes effect if the transform has an in-place hook,
    /// disabling only if it has a copying hook.
    pub fn set_in_place(&self, in_place: bool) {
        set_in_place_locked::<T>(&mut self.lock_state(), in_place);
    }

    /// Skip the transform hooks for GAP-flagged buffers.
    pub fn set_gap_aware(&self, gap_aware: bool) {
        self.lock_state().gap_aware = gap_aware;
    }

    /// Prefer offering the peer's caps unchanged in caps queries.
    pub fn set_prefer_passthrough(&self, prefer: bool) {
        self.lock_state().prefer_passthrough = prefer;
    }

    /// Defer `configure` to the next buffer after negotiating.
    pub fn set_delay_configure(&self, delay: bool) {
        self.lock_state().delay_configure = delay;
    }

    /// Re-run `configure` with the current caps before the next buffer.
    pub fn reconfigure(&self) {
        self.lock_state().pending_configure = true;
    }

    /// Renegotiate from the current input caps before the next buffer.
    pub fn reconfigure_src(&self) {
        self.src.mark_reconfigure();
    }

    /// Ask upstream to renegotiate towards `caps` and/or `size`.
    ///
    /// The suggestion is offered first in input caps queries. Returns whether
    /// upstream handled the reconfigure request.
    pub fn suggest(&self, caps: Option<Caps>, size: Option<usize>) -> bool {
        {
            let mut st = self.lock_state();
            st.suggestion = caps;
            st.suggested_size = size;
        }
        debug!(stage = %self.name, ?size, "suggesting new input format");
        match self.sink.peer() {
            Some((peer, pad)) => peer.upstream_event(pad, UpstreamEvent::Reconfigure),
            None => false,
        }
    }

    /// The most recent size suggestion.
    pub fn suggested_size(&self) -> Option<usize> {
        self.lock_state().suggested_size
    }

    /// Snapshot of the output allocation.
    ///
    /// Takes the stream lock, so this waits for an in-flight buffer.
    pub fn allocation(&self) -> AllocationBinding {
        self.lock_stream().binding.clone()
    }

    /// Handle an event arriving on the input pad.
    ///
    /// Returns the event to forward downstream. Caps events are replaced by
    /// the negotiated output caps.
    pub fn sink_event(&self, event: Event) -> Result<Option<Event>> {
        match event {
            Event::Caps(caps) => {
                self.negotiate(PadDirection::Input, &caps)?;
                Ok(self.src.caps().map(Event::Caps))
            }
            Event::Segment(segment) => {
                debug!(stage = %self.name, ?segment, "new segment");
                self.set_segment(segment.clone());
                Ok(Some(Event::Segment(segment)))
            }
            Event::FlushStart => {
                self.sink.set_flushing(true);
                let pool = self.lock_state().active_pool.clone();
                if let Some(pool) = pool {
                    pool.set_flushing(true);
                }
                Ok(Some(Event::FlushStart))
            }
            Event::FlushStop(stop) => {
                self.sink.set_flushing(false);
                let pool = {
                    let mut st = self.lock_state();
                    st.qos.reset();
                    st.discont_pending = true;
                    st.active_pool.clone()
                };
                if let Some(pool) = pool {
                    pool.set_flushing(false);
                }
                if stop.reset_time {
                    self.set_segment(Segment::default());
                }
                Ok(Some(Event::FlushStop(stop)))
            }
            other => Ok(Some(other)),
        }
    }

    fn set_segment(&self, segment: Segment) {
        let mut stream = self.lock_stream();
        self.lock_state().qos.segment = segment.clone();
        stream.segment = segment;
    }
}

fn set_in_place_locked<T: TransformImpl>(st: &mut ObjectState, in_place: bool) {
    if in_place && T::MODE.has_transform_ip() {
        st.in_place = true;
    } else if !in_place && T::MODE.has_transform() {
        st.in_place = false;
    }
}

fn default_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let short = full.rsplit("::").next().unwrap_or(full);
    short.to_ascii_lowercase()
}

/// Clears the negotiating flag when negotiation ends, on every exit path.
struct NegotiatingGuard<'a>(&'a AtomicBool);

impl<'a> NegotiatingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for NegotiatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: TransformImpl> PadPeer for Stage<T> {
    fn query_caps(&self, pad: PadDirection, filter: Option<&Caps>) -> Caps {
        Stage::query_caps(self, pad, filter)
    }

    fn accept_caps(&self, pad: PadDirection, caps: &Caps) -> bool {
        Stage::accept_caps(self, pad, caps)
    }

    fn is_negotiating(&self, _pad: PadDirection) -> bool {
        self.negotiating.load(Ordering::SeqCst)
    }

    fn propose_allocation(&self, pad: PadDirection, query: &mut AllocationQuery) -> bool {
        if pad != PadDirection::Input {
            return false;
        }
        if self.is_passthrough() {
            // The buffers we are asked about come straight back out.
            return match self.src.peer() {
                Some((peer, peer_pad)) => peer.propose_allocation(peer_pad, query),
                None => false,
            };
        }
        true
    }

    fn upstream_event(&self, pad: PadDirection, event: UpstreamEvent) -> bool {
        if pad != PadDirection::Output {
            return false;
        }
        match &event {
            UpstreamEvent::Qos(qos) => self.update_qos(qos.proportion, qos.diff, qos.timestamp),
            UpstreamEvent::Reconfigure => self.src.mark_reconfigure(),
        }
        if let Some((peer, peer_pad)) = self.sink.peer() {
            peer.upstream_event(peer_pad, event);
        }
        true
    }
}

impl<T: TransformImpl> std::fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.lock_state();
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("mode", &T::MODE)
            .field("negotiated", &st.negotiated)
            .field("passthrough", &st.passthrough)
            .field("in_place", &st.in_place)
            .finish()
    }
}

/// Link `upstream`'s output pad to `downstream`'s input pad.
///
/// Both stages keep only weak references to each other.
pub fn link<A: TransformImpl, B: TransformImpl>(upstream: &Arc<Stage<A>>, downstream: &Arc<Stage<B>>) {
    let up: Arc<dyn PadPeer> = upstream.clone();
    let down: Arc<dyn PadPeer> = downstream.clone();
    upstream.set_src_peer(&down, PadDirection::Input);
    downstream.set_sink_peer(&up, PadDirection::Output);
}
