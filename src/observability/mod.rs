//! Observability features: metrics and tracing.
//!
//! - **Metrics**: counters and histograms via `metrics-rs`
//! - **Tracing**: structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! Every metric carries a `stage` label.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `parallax_transform_buffers_processed` | Counter | Buffers that left a stage |
//! | `parallax_transform_buffers_dropped` | Counter | Buffers dropped by QoS |
//! | `parallax_transform_negotiations` | Counter | Negotiations (`result` = `ok`/`failed`) |
//! | `parallax_transform_allocation_fallbacks` | Counter | Ad hoc allocations after a pool failure |
//! | `parallax_transform_processing_time_ns` | Histogram | Dispatch time per buffer |
//!
//! ## Tracing
//!
//! Stages log negotiation steps and allocation decisions at `debug`,
//! per-buffer events at `trace`, and degraded paths at `warn`.
//!
//! ```rust
//! use parallax_transform::observability::init_metrics;
//!
//! // Call once at startup; install any metrics exporter to collect them.
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{StageMetrics, TimerGuard, init_metrics};
pub use tracing_support::{
    TracingConfig, span_negotiation, span_stage, trace_buffer_processed, trace_error,
};
