//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const BUFFERS_PROCESSED: &str = "parallax_transform_buffers_processed";
const BUFFERS_DROPPED: &str = "parallax_transform_buffers_dropped";
const NEGOTIATIONS: &str = "parallax_transform_negotiations";
const ALLOCATION_FALLBACKS: &str = "parallax_transform_allocation_fallbacks";
const PROCESSING_TIME_NS: &str = "parallax_transform_processing_time_ns";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_PROCESSED,
        Unit::Count,
        "Buffers that left a stage through any dispatch path"
    );
    metrics::describe_counter!(
        BUFFERS_DROPPED,
        Unit::Count,
        "Buffers dropped by the QoS governor"
    );
    metrics::describe_counter!(
        NEGOTIATIONS,
        Unit::Count,
        "Negotiation attempts, labelled by result"
    );
    metrics::describe_counter!(
        ALLOCATION_FALLBACKS,
        Unit::Count,
        "Output buffers allocated ad hoc after the bound pool failed"
    );
    metrics::describe_histogram!(
        PROCESSING_TIME_NS,
        Unit::Nanoseconds,
        "Time to dispatch a single buffer"
    );
}

/// Pre-labelled metric handles for one stage.
///
/// Resolving the handles once keeps label allocation off the per-buffer path.
#[derive(Clone)]
pub struct StageMetrics {
    stage: String,
    processed: Counter,
    dropped: Counter,
    fallbacks: Counter,
    processing_time: Histogram,
}

impl StageMetrics {
    /// Create handles labelled with `stage`.
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            processed: counter!(BUFFERS_PROCESSED, "stage" => stage.to_string()),
            dropped: counter!(BUFFERS_DROPPED, "stage" => stage.to_string()),
            fallbacks: counter!(ALLOCATION_FALLBACKS, "stage" => stage.to_string()),
            processing_time: histogram!(PROCESSING_TIME_NS, "stage" => stage.to_string()),
        }
    }

    /// Record a processed buffer.
    #[inline]
    pub fn record_processed(&self) {
        self.processed.increment(1);
    }

    /// Record a QoS drop.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.increment(1);
    }

    /// Record an allocation fallback.
    #[inline]
    pub fn record_fallback(&self) {
        self.fallbacks.increment(1);
    }

    /// Record a negotiation attempt.
    #[inline]
    pub fn record_negotiation(&self, success: bool) {
        let result = if success { "ok" } else { "failed" };
        counter!(NEGOTIATIONS, "stage" => self.stage.clone(), "result" => result).increment(1);
    }

    /// Start a timer and return a guard that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Get the stage name.
    pub fn stage(&self) -> &str {
        &self.stage
    }
}

impl std::fmt::Debug for StageMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageMetrics").field("stage", &self.stage).finish()
    }
}

/// Guard that records processing time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a StageMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics
            .processing_time
            .record(self.start.elapsed().as_nanos() as f64);
    }
}
