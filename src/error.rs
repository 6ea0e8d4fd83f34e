//! Error types for Parallax transform stages.

use crate::element::PadDirection;
use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single negotiation attempt.
///
/// Negotiation errors are terminal for the attempt that produced them. They
/// are never retried internally; the next fixed caps arriving on either pad
/// starts a fresh attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Caller misuse, e.g. negotiating with caps that are not fixed.
    #[error("invalid negotiation input: {0}")]
    InvalidInput(String),

    /// The transformed caps do not intersect the other pad's template or
    /// what its peer can take.
    #[error("no transform possible for {caps} arriving on the {direction:?} pad")]
    NoTransformPossible {
        /// Pad the caps arrived on.
        direction: PadDirection,
        /// The incoming caps.
        caps: String,
    },

    /// The candidate caps could not be reduced to a single fixed format.
    #[error("could not fixate {caps}")]
    CouldNotFixate {
        /// The candidate that stayed unfixed.
        caps: String,
    },

    /// The peer on the other pad refused the fixed candidate.
    #[error("peer rejected {caps}")]
    PeerRejected {
        /// The rejected caps.
        caps: String,
    },

    /// The implementation refused the negotiated input/output pair.
    #[error("configure failed: {reason}")]
    ConfigureFailed {
        /// Reason reported by the implementation.
        reason: String,
    },
}

/// Main error type for transform operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Negotiation failed (also raised by a deferred configure during dispatch).
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// A buffer arrived before caps were negotiated.
    #[error("stage is not negotiated")]
    NotNegotiated,

    /// The unit size of a format could not be determined.
    #[error("unit size unknown for {caps}")]
    SizeUnknown {
        /// The caps without a usable unit size.
        caps: String,
    },

    /// A buffer size is not a whole number of units.
    #[error("buffer size {size} is not a multiple of unit size {unit_size}")]
    SizeMismatch {
        /// Size of the input buffer.
        size: usize,
        /// Unit size of the input caps.
        unit_size: usize,
    },

    /// Output memory allocation failed.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// The pool or pad is flushing; in-flight waits are cancelled.
    #[error("flushing")]
    Flushing,

    /// The implementation lacks the hook the current mode requires.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// The implementation's transform hook failed.
    #[error("transform failed: {0}")]
    TransformFailed(String),

    /// Caller misuse outside negotiation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error came from a (possibly deferred) negotiation step.
    pub fn is_negotiation(&self) -> bool {
        matches!(self, Self::Negotiation(_) | Self::NotNegotiated)
    }
}
