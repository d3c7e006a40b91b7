//! Startup and shutdown of a set of frame sources.

use std::net::SocketAddr;

use tracing::{error, info};

use crate::error::{ReceiverError, Result};
use crate::queue::ActionQueue;
use crate::shutdown::ShutdownToken;
use crate::source::FrameSource;

/// Where a [`Controller`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the sources feeding one consumer queue and drives them through
/// `Created -> Running -> Stopping -> Stopped`.
///
/// Shutdown closes the queue first, so no frame callback runs once
/// [`Controller::shutdown`] has begun (or once the [`ShutdownToken`] from
/// [`Controller::shutdown_token`] has been cancelled), even if a network
/// thread is still blocked in a read. Then every source is stopped and its
/// threads joined. Dropping the controller shuts it down.
///
/// ```no_run
/// use framecast_receiver::{channel, Controller, DatagramSource, StreamSource};
/// # use framecast_receiver::{ConsumerError, FrameConsumer};
/// # use framecast_receiver::Frame;
/// # struct Screen;
/// # impl FrameConsumer for Screen {
/// #     fn on_frame(&mut self, _frame: Frame) -> Result<(), ConsumerError> { Ok(()) }
/// # }
/// # fn main() -> framecast_receiver::Result<()> {
/// let (queue, mut consumer) = channel(Screen);
/// let mut controller = Controller::new(queue)
///     .with_source(StreamSource::bind_to("0.0.0.0:12345".parse().unwrap()))
///     .with_source(DatagramSource::bind_to("0.0.0.0:12345".parse().unwrap()));
/// controller.start()?;
///
/// let token = controller.shutdown_token();
/// while !token.is_cancelled() {
///     consumer.wait_and_drain(std::time::Duration::from_millis(16));
/// }
/// controller.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Controller<C> {
    queue: ActionQueue<C>,
    sources: Vec<Box<dyn FrameSource<C>>>,
    state: LifecycleState,
}

impl<C> Controller<C> {
    pub fn new(queue: ActionQueue<C>) -> Self {
        Self {
            queue,
            sources: Vec::new(),
            state: LifecycleState::Created,
        }
    }

    /// Builder form of [`Controller::add_source`].
    ///
    /// Meant for construction; a source added after `start` is logged and
    /// dropped.
    pub fn with_source(mut self, source: impl FrameSource<C> + 'static) -> Self {
        if let Err(err) = self.add_source(source) {
            error!(error = %err, "source not added");
        }
        self
    }

    /// Register a source. Only allowed before `start`.
    pub fn add_source(&mut self, source: impl FrameSource<C> + 'static) -> Result<()> {
        self.expect_state(LifecycleState::Created)?;
        self.sources.push(Box::new(source));
        Ok(())
    }

    /// Start every source.
    ///
    /// If any source fails to start, the ones already running are stopped,
    /// the controller moves to `Stopped`, and the error is returned.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(LifecycleState::Created)?;

        for index in 0..self.sources.len() {
            let result = self.sources[index].start(self.queue.clone());
            if let Err(err) = result {
                error!(
                    source = self.sources[index].name(),
                    error = %err,
                    "failed to start source"
                );
                self.queue.close();
                for started in self.sources[..index].iter_mut().rev() {
                    started.stop();
                }
                self.state = LifecycleState::Stopped;
                return Err(err);
            }

            let source = &self.sources[index];
            if let Some(local_addr) = source.local_addr() {
                info!(source = source.name(), %local_addr, "source started");
            }
        }

        self.state = LifecycleState::Running;
        info!(sources = self.sources.len(), "receiver running");
        Ok(())
    }

    /// Stop accepting frames, stop every source and join its threads.
    ///
    /// Idempotent. From `Created` this goes straight to `Stopped`.
    pub fn shutdown(&mut self) {
        match self.state {
            LifecycleState::Stopping | LifecycleState::Stopped => return,
            LifecycleState::Created => {
                self.queue.close();
                self.state = LifecycleState::Stopped;
                return;
            }
            LifecycleState::Running => {}
        }

        self.state = LifecycleState::Stopping;
        info!("receiver shutting down");
        self.queue.close();
        for source in self.sources.iter_mut() {
            source.stop();
        }
        self.state = LifecycleState::Stopped;
        info!("receiver stopped");
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Handle for signal handlers. Cancelling it closes the queue; call
    /// [`Controller::shutdown`] afterwards to join the source threads.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.queue.shutdown_token()
    }

    /// Bound address of every running source, by source name.
    pub fn local_addrs(&self) -> Vec<(&'static str, SocketAddr)> {
        self.sources
            .iter()
            .filter_map(|source| source.local_addr().map(|addr| (source.name(), addr)))
            .collect()
    }

    /// Producer handle shared with the sources.
    pub fn queue(&self) -> &ActionQueue<C> {
        &self.queue
    }

    fn expect_state(&self, expected: LifecycleState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ReceiverError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl<C> Drop for Controller<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C> std::fmt::Debug for Controller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("sources", &self.sources.len())
            .field("queue", &self.queue)
            .finish()
    }
}
