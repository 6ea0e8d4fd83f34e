//! The neighbour behind a pad.
//!
//! Stages never own their neighbours. A pad holds a [`PeerLink`], a weak
//! handle plus the direction of the pad it addresses on the other side, and
//! upgrades it for the duration of a single call.

use super::pad::PadDirection;
use crate::event::UpstreamEvent;
use crate::format::Caps;
use crate::memory::BufferPool;
use std::sync::{Arc, Weak};

/// Queries and events a stage sends to its neighbours.
///
/// `pad` names the neighbour's own pad the call is addressed to: a stage
/// talking to its downstream neighbour addresses `PadDirection::Input`.
pub trait PadPeer: Send + Sync {
    /// Formats the pad can handle, optionally restricted to `filter`.
    fn query_caps(&self, pad: PadDirection, filter: Option<&Caps>) -> Caps;

    /// Whether the pad would take the fixed `caps` now.
    fn accept_caps(&self, pad: PadDirection, caps: &Caps) -> bool;

    /// Whether the neighbour is itself in the middle of negotiating.
    fn is_negotiating(&self, _pad: PadDirection) -> bool {
        false
    }

    /// Fill in allocation parameters for the format in `query`.
    ///
    /// Returns `false` if the query could not be answered.
    fn propose_allocation(&self, _pad: PadDirection, _query: &mut AllocationQuery) -> bool {
        false
    }

    /// Deliver an upstream event. Returns whether it was handled.
    fn upstream_event(&self, _pad: PadDirection, _event: UpstreamEvent) -> bool {
        false
    }
}

/// Non-owning link to a neighbour's pad.
#[derive(Clone, Debug)]
pub struct PeerLink {
    peer: Weak<dyn PadPeer>,
    pad: PadDirection,
}

impl PeerLink {
    /// Link to `pad` on `peer`.
    pub fn new(peer: &Arc<dyn PadPeer>, pad: PadDirection) -> Self {
        Self {
            peer: Arc::downgrade(peer),
            pad,
        }
    }

    /// Upgrade to a strong handle, if the neighbour is still alive.
    pub fn upgrade(&self) -> Option<(Arc<dyn PadPeer>, PadDirection)> {
        self.peer.upgrade().map(|peer| (peer, self.pad))
    }
}

// ============================================================================
// Allocation query
// ============================================================================

/// Memory layout requirements from downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationParams {
    /// Required alignment in bytes (0 or a power of two).
    pub align: usize,
}

/// One pool offer in an allocation answer.
#[derive(Clone)]
pub struct PoolProposal {
    /// The pool to allocate from, or `None` to only suggest sizes.
    pub pool: Option<Arc<dyn BufferPool>>,
    /// Buffer size in bytes (0 if unknown).
    pub size: usize,
    /// Minimum number of buffers.
    pub min_buffers: usize,
    /// Maximum number of buffers (0 = unlimited).
    pub max_buffers: usize,
}

impl PoolProposal {
    /// A proposal carrying a concrete pool.
    pub fn with_pool(pool: Arc<dyn BufferPool>, size: usize, min: usize, max: usize) -> Self {
        Self {
            pool: Some(pool),
            size,
            min_buffers: min,
            max_buffers: max,
        }
    }

    /// A sizing hint without a pool.
    pub fn sizes(size: usize, min: usize, max: usize) -> Self {
        Self {
            pool: None,
            size,
            min_buffers: min,
            max_buffers: max,
        }
    }
}

impl std::fmt::Debug for PoolProposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolProposal")
            .field("pool", &self.pool.as_ref().map(|p| p.name().to_string()))
            .field("size", &self.size)
            .field("min_buffers", &self.min_buffers)
            .field("max_buffers", &self.max_buffers)
            .finish()
    }
}

/// Allocation negotiation for a fixed output format.
#[derive(Debug, Clone)]
pub struct AllocationQuery {
    /// The negotiated output caps.
    pub caps: Caps,
    /// Whether the asker wants a pool, not only sizes.
    pub need_pool: bool,
    /// Offers in preference order.
    pub pools: Vec<PoolProposal>,
    /// Layout requirements, if any.
    pub params: Option<AllocationParams>,
}

impl AllocationQuery {
    /// An unanswered query for `caps`.
    pub fn new(caps: Caps, need_pool: bool) -> Self {
        Self {
            caps,
            need_pool,
            pools: Vec::new(),
            params: None,
        }
    }

    /// Append a pool offer.
    pub fn add_pool(&mut self, proposal: PoolProposal) {
        self.pools.push(proposal);
    }
}
