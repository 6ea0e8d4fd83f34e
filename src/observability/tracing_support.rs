//! Tracing integration for structured logging and spans.

use crate::element::PadDirection;
use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to create spans around negotiation.
    pub negotiation_spans: bool,
    /// Whether to create a span per dispatched buffer.
    pub buffer_spans: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            negotiation_spans: true,
            buffer_spans: false, // Can be expensive
        }
    }
}

impl TracingConfig {
    /// Enable all spans.
    pub fn all() -> Self {
        Self {
            negotiation_spans: true,
            buffer_spans: true,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            negotiation_spans: false,
            buffer_spans: false,
        }
    }
}

/// Create a span for a stage's buffer processing.
///
/// # Example
///
/// ```rust
/// use parallax_transform::observability::span_stage;
///
/// let span = span_stage("volume0", "Volume");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_stage(stage: &str, stage_type: &str) -> Span {
    span!(Level::TRACE, "stage", stage = %stage, stage_type = %stage_type)
}

/// Create a span for one negotiation attempt.
#[inline]
pub fn span_negotiation(stage: &str, direction: PadDirection) -> Span {
    span!(Level::DEBUG, "negotiate", stage = %stage, direction = ?direction)
}

/// Log a buffer leaving the stage.
#[inline]
pub fn trace_buffer_processed(stage: &str, path: &str, size: usize, sequence: u64) {
    tracing::trace!(
        stage = %stage,
        path = %path,
        size = size,
        sequence = sequence,
        "buffer processed"
    );
}

/// Log a dispatch error. The error is still returned to the caller.
#[inline]
pub fn trace_error(stage: &str, error: &dyn std::error::Error) {
    tracing::debug!(stage = %stage, error = %error, "buffer dispatch failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config() {
        let config = TracingConfig::default();
        assert!(config.negotiation_spans);
        assert!(!config.buffer_spans);
        assert!(TracingConfig::all().buffer_spans);
        assert!(!TracingConfig::none().negotiation_spans);
    }

    #[test]
    fn test_span_creation() {
        let _span = span_stage("stage0", "Identity");
        let _span = span_negotiation("stage0", PadDirection::Input);
    }

    #[test]
    fn test_trace_functions() {
        trace_buffer_processed("stage0", "copy", 100, 0);
        trace_error("stage0", &crate::error::Error::NotNegotiated);
    }
}
