//! Socket transport for framecast.
//!
//! Thin wrappers over the standard library sockets that fix the behavior the
//! receivers rely on:
//! - a TCP listener that is polled (non-blocking accept) so an accept thread
//!   can observe a shutdown flag between ticks
//! - connected TCP streams that can be shut down from another thread to
//!   unblock a pending read
//! - UDP sockets whose receive call returns `None` on a read timeout
//!
//! This is the lowest layer of framecast. Everything else builds on top of
//! [`NetStream`], [`StreamListener`] and [`DatagramSocket`].

pub mod error;
pub mod stream;
pub mod tcp;
pub mod udp;

pub use error::{Result, TransportError};
pub use stream::NetStream;
pub use tcp::StreamListener;
pub use udp::{DatagramSocket, MAX_DATAGRAM_SIZE};
