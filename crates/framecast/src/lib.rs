//! Receive image frames over TCP and UDP and hand them to a single consumer
//! thread.
//!
//! Frames arrive as arbitrarily fragmented TCP byte streams or as one UDP
//! datagram each. framecast reassembles them, turns `START` / `STOP`
//! datagrams into commands, and queues everything for the one thread that
//! owns the display state.
//!
//! # Crate Structure
//!
//! - [`transport`]: polled TCP listener, TCP streams, UDP sockets
//! - [`frame`]: frame boundary detection, reassembly and the sending side
//! - [`receiver`]: action queue, TCP and UDP sources, lifecycle controller
//!   (behind the default `receiver` feature)

/// Re-export transport types.
pub mod transport {
    pub use framecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framecast_frame::*;
}

/// Re-export receiver types (requires `receiver` feature).
#[cfg(feature = "receiver")]
pub mod receiver {
    pub use framecast_receiver::*;
}
