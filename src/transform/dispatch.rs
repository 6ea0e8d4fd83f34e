//! Per-buffer dispatch.

use super::{Stage, StreamState};
use crate::buffer::Buffer;
use crate::element::{PadDirection, TransformImpl};
use crate::error::{Error, Result};
use crate::memory::BufferPool;
use crate::observability::{span_stage, trace_buffer_processed, trace_error};
use tracing::{debug, warn};

/// Which of the three processing paths a buffer took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Passthrough,
    InPlace,
    Copy,
}

impl Path {
    fn as_str(self) -> &'static str {
        match self {
            Path::Passthrough => "passthrough",
            Path::InPlace => "in_place",
            Path::Copy => "copy",
        }
    }
}

impl<T: TransformImpl> Stage<T> {
    /// Run one input buffer through the stage.
    ///
    /// Returns `Ok(None)` when QoS dropped the buffer. Buffers leave in the
    /// order they arrived; the stream lock is held for the whole call.
    ///
    /// # Errors
    ///
    /// - [`Error::Flushing`] between `FlushStart` and `FlushStop`
    /// - [`Error::NotNegotiated`] before a successful negotiation
    /// - [`Error::NotSupported`] when the current mode needs a hook the
    ///   transform does not have
    /// - size and hook errors from the transform itself
    pub fn process(&self, buffer: Buffer) -> Result<Option<Buffer>> {
        let mut stream = self.lock_stream();
        let _span = self
            .config
            .tracing
            .buffer_spans
            .then(|| span_stage(&self.name, std::any::type_name::<T>()).entered());
        let _timer = self.metrics.start_timer();

        let result = self.process_locked(&mut stream, buffer);
        if let Err(e) = &result {
            trace_error(&self.name, e);
        }
        result
    }

    fn process_locked(&self, stream: &mut StreamState, buffer: Buffer) -> Result<Option<Buffer>> {
        if self.sink.is_flushing() {
            return Err(Error::Flushing);
        }

        if self.src.check_reconfigure() {
            if let Some(caps) = self.sink.caps() {
                debug!(stage = %self.name, "renegotiating before buffer");
                let done = self.negotiate_locked(stream, PadDirection::Input, &caps);
                // Keep the mark until a renegotiation actually completes.
                if !matches!(done, Ok(true)) {
                    self.src.mark_reconfigure();
                }
                done?;
            }
        }

        let (negotiated, pending) = {
            let st = self.lock_state();
            (st.negotiated, st.pending_configure)
        };
        if !negotiated {
            return Err(Error::NotNegotiated);
        }
        if pending {
            self.apply_pending_configure(stream)?;
        }

        self.imp.before_transform(&buffer);

        if self.check_qos(stream, &buffer) {
            return Ok(None);
        }

        let (passthrough, in_place, gap_aware) = {
            let st = self.lock_state();
            (st.passthrough, st.in_place, st.gap_aware)
        };
        let skip = gap_aware && buffer.metadata().flags.is_gap();

        let (path, mut output) = if passthrough {
            if T::TRANSFORM_IP_ON_PASSTHROUGH && !skip {
                self.imp.transform_ip_passthrough(&buffer)?;
            }
            (Path::Passthrough, buffer)
        } else if in_place {
            (Path::InPlace, self.run_in_place(buffer, skip)?)
        } else {
            (Path::Copy, self.run_copy(stream, &buffer, skip)?)
        };

        let discont = {
            let mut st = self.lock_state();
            st.qos.processed += 1;
            std::mem::take(&mut st.discont_pending)
        };
        if discont {
            output.metadata_mut().flags.set_discont(true);
        }

        self.metrics.record_processed();
        trace_buffer_processed(&self.name, path.as_str(), output.len(), output.metadata().sequence);
        Ok(Some(output))
    }

    fn run_in_place(&self, buffer: Buffer, skip: bool) -> Result<Buffer> {
        if !T::MODE.has_transform_ip() {
            return Err(Error::NotSupported("transform_ip"));
        }
        if skip {
            return Ok(buffer);
        }
        let mut buffer = if buffer.is_writable() {
            buffer
        } else {
            debug!(stage = %self.name, "input not writable, copying for in-place transform");
            buffer.copy_deep()?
        };
        self.imp.transform_ip(&mut buffer)?;
        Ok(buffer)
    }

    fn run_copy(&self, stream: &mut StreamState, input: &Buffer, skip: bool) -> Result<Buffer> {
        if !T::MODE.has_transform() {
            return Err(Error::NotSupported("transform"));
        }
        let (Some(incaps), Some(outcaps)) = (self.sink.caps(), self.src.caps()) else {
            return Err(Error::NotNegotiated);
        };
        let size = self.transform_size(PadDirection::Input, &incaps, input.len(), &outcaps)?;

        let mut output = self.allocate_output(stream, size)?;
        self.imp.copy_metadata(input, &mut output);
        if !skip {
            self.imp.transform(input, &mut output)?;
        }
        Ok(output)
    }

    /// An output buffer of exactly `size` bytes.
    ///
    /// Uses the bound pool when its buffers are big enough; a local pool is
    /// grown to fit first. A pool failure other than flushing falls back to
    /// one ad hoc allocation.
    fn allocate_output(&self, stream: &mut StreamState, size: usize) -> Result<Buffer> {
        if let Err(e) = self.grow_local_pool(stream, size) {
            warn!(stage = %self.name, error = %e, "failed to grow local pool");
        }
        let Some(pool) = stream.binding.pool().filter(|p| p.config().size >= size) else {
            return Buffer::allocate(size);
        };

        match acquire_sized(&**pool, size) {
            Ok(buffer) => Ok(buffer),
            Err(Error::Flushing) => Err(Error::Flushing),
            Err(e) => {
                warn!(stage = %self.name, pool = %pool.name(), error = %e, "pool allocation failed, allocating ad hoc");
                self.metrics.record_fallback();
                Buffer::allocate(size)
            }
        }
    }
}

fn acquire_sized(pool: &dyn BufferPool, size: usize) -> Result<Buffer> {
    let mut buffer = pool.acquire()?;
    buffer.set_len(size)?;
    Ok(buffer)
}
