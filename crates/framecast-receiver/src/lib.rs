//! Frame receivers and cross-thread dispatch.
//!
//! Network threads never touch consumer state. A [`StreamSource`] (TCP) and
//! a [`DatagramSource`] (UDP) turn incoming bytes into complete
//! [`Frame`]s and [`Command`]s, and enqueue one action per item on an
//! [`ActionQueue`]. The thread that owns the [`ConsumerLoop`] drains the
//! queue and runs each action against its [`FrameConsumer`], in FIFO order.
//!
//! A [`Controller`] starts the sources together and shuts them down in the
//! one order that keeps callbacks from firing after shutdown: close the
//! queue, then stop and join the network threads.

pub mod command;
pub mod consumer;
pub mod controller;
pub mod datagram;
pub mod error;
pub mod queue;
pub mod shutdown;
pub mod source;
pub mod stream;

pub use command::{Command, START_COMMAND, STOP_COMMAND};
pub use consumer::FrameConsumer;
pub use controller::{Controller, LifecycleState};
pub use datagram::{DatagramConfig, DatagramSource, DEFAULT_REBIND_DELAY};
pub use error::{ConsumerError, QueueError, ReceiverError, Result};
pub use framecast_frame::Frame;
pub use queue::{
    channel, channel_with_config, Action, ActionQueue, ConsumerLoop, DrainReport, QueueConfig,
};
pub use shutdown::ShutdownToken;
pub use source::FrameSource;
pub use stream::{
    Connection, ConnectionPolicy, StreamConfig, StreamSource, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT, DEFAULT_READ_CHUNK_SIZE,
};
