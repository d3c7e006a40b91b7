use std::ops::Range;

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// JPEG end-of-image marker.
pub const JPEG_END_MARKER: [u8; 2] = [0xFF, 0xD9];

/// A buffer must be strictly longer than this before [`EndMarker`] reports a frame.
pub const DEFAULT_MIN_FRAME_SIZE: usize = 512;

/// Length prefix size used by [`LengthPrefixed`].
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Location of a complete frame at the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// Bytes to remove from the front of the buffer.
    pub consumed: usize,
    /// Range of the frame payload inside the consumed bytes.
    pub payload: Range<usize>,
}

impl Boundary {
    /// The whole prefix of `len` bytes is the frame.
    pub fn whole(len: usize) -> Self {
        Self {
            consumed: len,
            payload: 0..len,
        }
    }
}

/// Decides where a frame ends inside an accumulating buffer.
///
/// Implementations must be pure functions of the buffer contents: the
/// assembler calls [`FrameBoundary::detect`] after every append and again
/// after each extracted frame until it returns `Ok(None)`.
pub trait FrameBoundary: Send + Sync + std::fmt::Debug {
    /// Strategy name for logs and errors.
    fn name(&self) -> &'static str;

    /// Report the first complete frame in `buf`, if there is one.
    fn detect(&self, buf: &[u8]) -> Result<Option<Boundary>>;

    /// Append `payload` to `dst` so that a receiver using the same strategy
    /// sees exactly one frame.
    fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()>;
}

/// Content-sniffing boundary: the buffer is one frame once it is longer than
/// `min_frame_size` and its last two bytes equal `marker`.
///
/// A marker pair that happens to sit at the end of a read chunk inside real
/// content ends the frame early. Use [`LengthPrefixed`] when the sender can
/// be changed and that matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndMarker {
    marker: [u8; 2],
    min_frame_size: usize,
}

impl EndMarker {
    pub fn new(marker: [u8; 2], min_frame_size: usize) -> Self {
        Self {
            marker,
            min_frame_size,
        }
    }

    /// JPEG end-of-image marker with the default minimum size.
    pub fn jpeg() -> Self {
        Self::new(JPEG_END_MARKER, DEFAULT_MIN_FRAME_SIZE)
    }

    pub fn with_min_frame_size(mut self, min_frame_size: usize) -> Self {
        self.min_frame_size = min_frame_size;
        self
    }

    pub fn marker(&self) -> [u8; 2] {
        self.marker
    }

    pub fn min_frame_size(&self) -> usize {
        self.min_frame_size
    }

    fn is_complete(&self, buf: &[u8]) -> bool {
        buf.len() > self.min_frame_size && buf.ends_with(&self.marker)
    }
}

impl Default for EndMarker {
    fn default() -> Self {
        Self::jpeg()
    }
}

impl FrameBoundary for EndMarker {
    fn name(&self) -> &'static str {
        "end-marker"
    }

    fn detect(&self, buf: &[u8]) -> Result<Option<Boundary>> {
        if self.is_complete(buf) {
            Ok(Some(Boundary::whole(buf.len())))
        } else {
            Ok(None)
        }
    }

    fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() <= self.min_frame_size {
            return Err(FrameError::NotDelimited {
                len: payload.len(),
                boundary: self.name(),
                reason: "payload not longer than the minimum frame size",
            });
        }
        if !payload.ends_with(&self.marker) {
            return Err(FrameError::NotDelimited {
                len: payload.len(),
                boundary: self.name(),
                reason: "payload does not end with the end marker",
            });
        }
        dst.put_slice(payload);
        Ok(())
    }
}

/// Explicit framing: a 4-byte big-endian payload length, then the payload.
///
/// ```text
/// ┌──────────────────┬─────────────────────┐
/// │ Length (4 bytes) │ Payload             │
/// │ Big-endian u32   │ (Length bytes)      │
/// └──────────────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthPrefixed {
    max_frame_size: usize,
}

impl LengthPrefixed {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for LengthPrefixed {
    fn default() -> Self {
        Self::new(crate::assembler::DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameBoundary for LengthPrefixed {
    fn name(&self) -> &'static str {
        "length-prefixed"
    }

    fn detect(&self, buf: &[u8]) -> Result<Option<Boundary>> {
        let Some(header) = buf.get(..LENGTH_PREFIX_SIZE) else {
            return Ok(None);
        };
        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        len_bytes.copy_from_slice(header);
        let payload_len = u32::from_be_bytes(len_bytes) as usize;

        if payload_len > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: payload_len,
                max: self.max_frame_size,
            });
        }

        let total = LENGTH_PREFIX_SIZE + payload_len;
        if buf.len() < total {
            return Ok(None);
        }

        Ok(Some(Boundary {
            consumed: total,
            payload: LENGTH_PREFIX_SIZE..total,
        }))
    }

    fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        let max = self.max_frame_size.min(u32::MAX as usize);
        if payload.len() > max {
            return Err(FrameError::FrameTooLarge {
                size: payload.len(),
                max,
            });
        }
        dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload);
        Ok(())
    }
}
