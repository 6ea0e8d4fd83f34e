//! Stage configuration.

use crate::observability::TracingConfig;

/// Construction-time settings of a [`Stage`](super::Stage).
///
/// ```rust
/// use parallax_transform::transform::StageConfig;
///
/// let config = StageConfig::default()
///     .with_name("volume0")
///     .with_qos(true)
///     .with_pool_buffers(4, 8);
/// assert_eq!(config.pool_max_buffers, 8);
/// ```
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Stage name used in logs and metric labels.
    pub name: Option<String>,
    /// Whether the QoS governor starts enabled.
    pub qos: bool,
    /// Skip the transform hooks for GAP-flagged buffers.
    pub gap_aware: bool,
    /// Offer the peer's caps unchanged first when answering caps queries.
    pub prefer_passthrough: bool,
    /// Defer `configure` from negotiation to the next buffer.
    pub delay_configure: bool,
    /// Buffers preallocated by a local output pool.
    pub pool_min_buffers: usize,
    /// Outstanding buffer limit of a local output pool (0 = unlimited).
    pub pool_max_buffers: usize,
    /// Span settings.
    pub tracing: TracingConfig,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            name: None,
            qos: false,
            gap_aware: false,
            prefer_passthrough: true,
            delay_configure: false,
            pool_min_buffers: 2,
            pool_max_buffers: 0,
            tracing: TracingConfig::default(),
        }
    }
}

impl StageConfig {
    /// Set the stage name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable QoS.
    pub fn with_qos(mut self, enabled: bool) -> Self {
        self.qos = enabled;
        self
    }

    /// Enable or disable gap awareness.
    pub fn with_gap_aware(mut self, gap_aware: bool) -> Self {
        self.gap_aware = gap_aware;
        self
    }

    /// Set the passthrough preference for caps queries.
    pub fn with_prefer_passthrough(mut self, prefer: bool) -> Self {
        self.prefer_passthrough = prefer;
        self
    }

    /// Defer configuration to the first buffer.
    pub fn with_delay_configure(mut self, delay: bool) -> Self {
        self.delay_configure = delay;
        self
    }

    /// Set local pool buffer counts.
    pub fn with_pool_buffers(mut self, min: usize, max: usize) -> Self {
        self.pool_min_buffers = min;
        self.pool_max_buffers = max;
        self
    }

    /// Set span settings.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}
