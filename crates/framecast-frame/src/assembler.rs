use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::boundary::{EndMarker, FrameBoundary};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Default upper bound on a buffered frame: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Configuration for a [`FrameAssembler`].
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Largest number of bytes the assembler buffers while waiting for a
    /// boundary. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Turns an arbitrarily chunked byte stream into complete frames.
///
/// Bytes are appended in arrival order. After every append the boundary
/// strategy is asked for complete frames; each one is split off the front of
/// the buffer, so the bytes of a handed-out [`Frame`] never alias the region
/// that keeps accumulating.
pub struct FrameAssembler {
    boundary: Arc<dyn FrameBoundary>,
    buf: BytesMut,
    config: AssemblerConfig,
    frames_emitted: u64,
}

impl FrameAssembler {
    /// Create an assembler with default configuration.
    pub fn new(boundary: Arc<dyn FrameBoundary>) -> Self {
        Self::with_config(boundary, AssemblerConfig::default())
    }

    /// Create an assembler with explicit configuration.
    pub fn with_config(boundary: Arc<dyn FrameBoundary>, config: AssemblerConfig) -> Self {
        Self {
            boundary,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            frames_emitted: 0,
        }
    }

    /// Assembler for JPEG streams delimited by the end-of-image marker.
    pub fn jpeg() -> Self {
        Self::new(Arc::new(EndMarker::jpeg()))
    }

    /// Append `bytes` and push every frame completed by them onto `frames`.
    ///
    /// Frames found before an error stay in `frames`. On error the partial
    /// buffer is discarded so the next frame starts clean.
    pub fn feed(&mut self, bytes: &[u8], frames: &mut Vec<Frame>) -> Result<()> {
        self.buf.extend_from_slice(bytes);

        loop {
            let boundary = match self.boundary.detect(&self.buf) {
                Ok(Some(boundary)) => boundary,
                Ok(None) => break,
                Err(err) => {
                    self.discard(&err);
                    return Err(err);
                }
            };

            let consumed = self.buf.split_to(boundary.consumed).freeze();
            let frame = Frame::new(consumed.slice(boundary.payload));
            self.frames_emitted = self.frames_emitted.saturating_add(1);
            debug!(
                len = frame.len(),
                boundary = self.boundary.name(),
                "frame complete"
            );
            frames.push(frame);

            if self.buf.capacity() == 0 {
                self.buf.reserve(INITIAL_BUFFER_CAPACITY);
            }
        }

        if self.buf.len() > self.config.max_frame_size {
            let err = FrameError::FrameTooLarge {
                size: self.buf.len(),
                max: self.config.max_frame_size,
            };
            self.discard(&err);
            return Err(err);
        }

        Ok(())
    }

    /// Bytes buffered towards the next frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Number of frames produced since creation.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Active boundary strategy.
    pub fn boundary(&self) -> &dyn FrameBoundary {
        self.boundary.as_ref()
    }

    /// Current assembler configuration.
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    fn discard(&mut self, err: &FrameError) {
        warn!(
            error = %err,
            dropped = self.buf.len(),
            "discarding partial frame"
        );
        self.buf.clear();
    }
}

impl std::fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAssembler")
            .field("boundary", &self.boundary.name())
            .field("buffered", &self.buf.len())
            .field("frames_emitted", &self.frames_emitted)
            .finish()
    }
}
