use bytes::Bytes;

/// Image container recognized from the leading bytes of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Png,
    Unknown,
}

impl FrameFormat {
    const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
    const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

    /// Guess the container from the first bytes. Nothing is decoded.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&Self::JPEG_MAGIC) {
            Self::Jpeg
        } else if bytes.starts_with(&Self::PNG_MAGIC) {
            Self::Png
        } else {
            Self::Unknown
        }
    }

    /// Short lowercase name, also used as a file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Unknown => "bin",
        }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One complete logical image extracted from a stream or a datagram.
///
/// The bytes are immutable and reference-counted; cloning a frame does not
/// copy the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a frame from owned bytes.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Create a frame by copying a borrowed slice.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Container sniffed from the frame header.
    pub fn format(&self) -> FrameFormat {
        FrameFormat::sniff(&self.payload)
    }

    /// Consume the frame and return the payload.
    pub fn into_bytes(self) -> Bytes {
        self.payload
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}
