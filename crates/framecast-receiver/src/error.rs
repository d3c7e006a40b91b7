use crate::controller::LifecycleState;

/// Errors returned when handing work to the consumer queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Shutdown has begun; no further actions are accepted.
    #[error("action queue closed")]
    Closed,

    /// The queue holds its configured maximum number of pending actions.
    #[error("action queue full ({capacity} pending)")]
    Full { capacity: usize },
}

/// Errors reported by a [`crate::FrameConsumer`] callback.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The frame bytes could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// The decoded frame could not be applied to the consumer's state.
    #[error("apply failed: {0}")]
    Apply(String),

    /// Any other consumer-side failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that can occur while starting or running receivers.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// Transport-level error (bind, accept, socket I/O).
    #[error("transport error: {0}")]
    Transport(#[from] framecast_transport::TransportError),

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid lifecycle state: expected {expected}, found {actual}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },

    /// The source is already running.
    #[error("{0} source already started")]
    AlreadyStarted(&'static str),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ReceiverError>;
