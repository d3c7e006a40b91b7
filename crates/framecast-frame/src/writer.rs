use std::io::{ErrorKind, Write};
use std::sync::Arc;

use bytes::BytesMut;

use crate::boundary::{EndMarker, FrameBoundary};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Writes complete frames to any `Write` stream, delimited by a
/// [`FrameBoundary`] that the receiving assembler also uses.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    boundary: Arc<dyn FrameBoundary>,
}

impl<T: Write> FrameWriter<T> {
    /// Create a frame writer for JPEG streams delimited by their end marker.
    pub fn new(inner: T) -> Self {
        Self::with_boundary(inner, Arc::new(EndMarker::jpeg()))
    }

    /// Create a frame writer with an explicit boundary strategy.
    pub fn with_boundary(inner: T, boundary: Arc<dyn FrameBoundary>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            boundary,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.as_bytes())
    }

    /// Encode and send one payload.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        self.boundary.encode(payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Active boundary strategy.
    pub fn boundary(&self) -> &dyn FrameBoundary {
        self.boundary.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::assembler::FrameAssembler;
    use crate::boundary::{LengthPrefixed, JPEG_END_MARKER};

    fn jpeg_frame(len: usize) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len - 2, 0x42);
        bytes.extend_from_slice(&JPEG_END_MARKER);
        bytes
    }

    #[test]
    fn end_marker_frames_are_written_verbatim() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let frame = jpeg_frame(1200);

        writer.send(&frame).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, frame);
    }

    #[test]
    fn written_frames_reassemble() {
        let boundary: Arc<dyn FrameBoundary> = Arc::new(LengthPrefixed::default());
        let mut writer =
            FrameWriter::with_boundary(Cursor::new(Vec::<u8>::new()), Arc::clone(&boundary));

        writer.write_frame(&Frame::new(&b"one"[..])).unwrap();
        writer.send(b"two").unwrap();
        writer.send(b"three").unwrap();

        let wire = writer.into_inner().into_inner();
        let mut assembler = FrameAssembler::new(boundary);
        let mut frames = Vec::new();
        assembler.feed(&wire, &mut frames).unwrap();

        let payloads: Vec<&[u8]> = frames.iter().map(Frame::as_bytes).collect();
        assert_eq!(payloads, vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
    }

    #[test]
    fn undelimited_payload_rejected_before_writing() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let err = writer.send(b"not an image").unwrap_err();
        assert!(matches!(err, FrameError::NotDelimited { .. }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send(&jpeg_frame(600)).unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.data.len(), 600);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(&jpeg_frame(600)).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
