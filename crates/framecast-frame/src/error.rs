/// Errors that can occur while assembling or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffered or announced frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The payload cannot be delimited by the active boundary strategy.
    #[error("payload of {len} bytes is not delimited for {boundary}: {reason}")]
    NotDelimited {
        len: usize,
        boundary: &'static str,
        reason: &'static str,
    },

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before the frame was fully written.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
