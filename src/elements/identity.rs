//! Identity stage with callbacks for debugging.
//!
//! A pure observer that lets buffers through untouched while exposing them
//! to an optional callback.

use crate::buffer::Buffer;
use crate::element::{TransformImpl, TransformMode};
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback type for buffer inspection.
pub type BufferCallback = Box<dyn Fn(&Buffer) + Send + Sync>;

/// Passes buffers through unchanged while optionally calling a callback for
/// inspection.
///
/// Useful for debugging, logging, or metrics collection without touching
/// the data flow. Negotiation always ends in passthrough.
///
/// # Example
///
/// ```rust
/// use parallax_transform::prelude::*;
///
/// let identity = Identity::new().on_buffer(|buf| {
///     println!("Buffer: seq={}, len={}", buf.metadata().sequence, buf.len());
/// });
/// let stage = Stage::new(identity, StageConfig::default().with_name("debug-point"));
/// assert!(stage.is_passthrough());
/// ```
pub struct Identity {
    callback: Option<BufferCallback>,
    count: AtomicU64,
    bytes: AtomicU64,
}

impl Identity {
    /// Create a new identity transform.
    pub fn new() -> Self {
        Self {
            callback: None,
            count: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Set a callback to be called for each buffer.
    pub fn on_buffer<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Buffer) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Get the number of buffers seen.
    pub fn buffer_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the total bytes seen.
    pub fn byte_count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Get statistics.
    pub fn stats(&self) -> IdentityStats {
        IdentityStats {
            buffer_count: self.buffer_count(),
            byte_count: self.byte_count(),
        }
    }

    /// Reset statistics.
    pub fn reset_stats(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformImpl for Identity {
    const MODE: TransformMode = TransformMode::Passthrough;

    fn transform_ip_passthrough(&self, buffer: &Buffer) -> Result<()> {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(buffer.len() as u64, Ordering::Relaxed);

        if let Some(cb) = &self.callback {
            cb(buffer);
        }
        Ok(())
    }
}

/// Statistics for [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityStats {
    /// Number of buffers seen.
    pub buffer_count: u64,
    /// Total bytes seen.
    pub byte_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::PadDirection;
    use crate::format::Caps;
    use crate::metadata::Metadata;
    use crate::transform::{Stage, StageConfig};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn create_test_buffer(size: usize, seq: u64) -> Buffer {
        Buffer::from_vec(vec![0; size], Metadata::with_sequence(seq))
    }

    fn negotiated(identity: Identity) -> Arc<Stage<Identity>> {
        let stage = Stage::new(identity, StageConfig::default());
        let caps = Caps::builder("application/octet-stream").build();
        stage.negotiate(PadDirection::Input, &caps).unwrap();
        stage
    }

    #[test]
    fn test_identity_passthrough() {
        let stage = negotiated(Identity::new());

        let buffer = create_test_buffer(100, 42);
        let keep = buffer.clone();
        let buf = stage.process(buffer).unwrap().unwrap();

        assert_eq!(buf.metadata().sequence, 42);
        assert_eq!(buf.len(), 100);
        assert!(buf.shares_memory(&keep));
    }

    #[test]
    fn test_identity_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let stage = negotiated(Identity::new().on_buffer(move |_buf| {
            call_count_clone.fetch_add(1, Ordering::Relaxed);
        }));

        for i in 0..5 {
            stage.process(create_test_buffer(50, i)).unwrap();
        }

        assert_eq!(call_count.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_identity_stats() {
        let stage = negotiated(Identity::new());

        stage.process(create_test_buffer(100, 0)).unwrap();
        stage.process(create_test_buffer(200, 1)).unwrap();
        stage.process(create_test_buffer(50, 2)).unwrap();

        let stats = stage.imp().stats();
        assert_eq!(stats.buffer_count, 3);
        assert_eq!(stats.byte_count, 350);
    }

    #[test]
    fn test_identity_reset_stats() {
        let stage = negotiated(Identity::new());

        stage.process(create_test_buffer(100, 0)).unwrap();
        assert_eq!(stage.imp().buffer_count(), 1);

        stage.imp().reset_stats();
        assert_eq!(stage.imp().buffer_count(), 0);
        assert_eq!(stage.imp().byte_count(), 0);
    }
}
