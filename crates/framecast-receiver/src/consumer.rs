use framecast_frame::Frame;
use tracing::debug;

use crate::command::Command;
use crate::error::ConsumerError;

/// State owned by the consumer thread: the display surface, the indicator,
/// whatever must never be touched from a network thread.
///
/// Receivers never call these methods directly. They enqueue actions that
/// the [`crate::ConsumerLoop`] runs on the one thread that owns the consumer.
/// Implementations should return promptly; a slow callback delays every
/// frame queued behind it.
pub trait FrameConsumer: 'static {
    /// Decode and apply one complete frame.
    fn on_frame(&mut self, frame: Frame) -> Result<(), ConsumerError>;

    /// React to a control command. Ignored unless overridden.
    fn on_command(&mut self, command: Command) -> Result<(), ConsumerError> {
        debug!(%command, "command ignored by consumer");
        Ok(())
    }
}
