use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use framecast_frame::Frame;
use tracing::{debug, warn};

use crate::command::Command;
use crate::consumer::FrameConsumer;
use crate::error::{QueueError, Result};
use crate::queue::ActionQueue;

/// A network receiver that turns traffic into queued consumer actions.
///
/// `start` binds and spawns the source's worker threads, then returns. From
/// then on the source only ever talks to the consumer through `queue`.
/// `stop` must be idempotent, must return only after every worker thread has
/// exited, and must be safe to call on a source that never started.
pub trait FrameSource<C>: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Bind and start receiving.
    fn start(&mut self, queue: ActionQueue<C>) -> Result<()>;

    /// Stop receiving and join worker threads.
    fn stop(&mut self);

    /// Bound address while running.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Queue `on_frame` for the consumer. Returns `false` once the queue is
/// closed and the caller should stop receiving.
pub(crate) fn dispatch_frame<C: FrameConsumer>(
    queue: &ActionQueue<C>,
    frame: Frame,
    source: &'static str,
) -> bool {
    let len = frame.len();
    let format = frame.format();
    match queue.enqueue(move |consumer: &mut C| consumer.on_frame(frame)) {
        Ok(()) => {
            debug!(source, len, %format, "frame queued");
            true
        }
        Err(err) => queue_rejected(err, source, "frame"),
    }
}

/// Queue `on_command` for the consumer. Same return contract as
/// [`dispatch_frame`].
pub(crate) fn dispatch_command<C: FrameConsumer>(
    queue: &ActionQueue<C>,
    command: Command,
    source: &'static str,
) -> bool {
    match queue.enqueue(move |consumer: &mut C| consumer.on_command(command)) {
        Ok(()) => {
            debug!(source, %command, "command queued");
            true
        }
        Err(err) => queue_rejected(err, source, "command"),
    }
}

fn queue_rejected(err: QueueError, source: &'static str, kind: &'static str) -> bool {
    match err {
        QueueError::Full { capacity } => {
            warn!(source, kind, capacity, "consumer queue full; dropping");
            true
        }
        QueueError::Closed => {
            debug!(source, kind, "consumer queue closed; dropping");
            false
        }
    }
}

/// Lock a mutex whose data stays consistent even if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
