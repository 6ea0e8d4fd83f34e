//! Pads, peers and the transform hook trait.
//!
//! - [`Pad`]: a directional connection point with a template and current caps
//! - [`PadPeer`]: what a stage can ask of its neighbour (caps and accept
//!   queries, allocation, upstream events)
//! - [`PeerLink`]: weak handle from a pad to its neighbour
//! - [`TransformImpl`]: the semantic hooks a concrete transform provides
//! - [`TransformMode`]: which processing hooks exist

mod pad;
mod peer;
mod traits;

pub use pad::{Pad, PadDirection};
pub use peer::{AllocationParams, AllocationQuery, PadPeer, PeerLink, PoolProposal};
pub use traits::{TransformImpl, TransformMode};
