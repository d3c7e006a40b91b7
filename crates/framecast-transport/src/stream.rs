use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// A connected TCP stream. Implements `Read` and `Write`.
///
/// This is the I/O type returned by [`crate::StreamListener::poll_accept`] and
/// [`NetStream::connect`]. A clone obtained with [`NetStream::try_clone`]
/// refers to the same socket, so calling [`NetStream::shutdown`] on the clone
/// unblocks a read pending on the original.
pub struct NetStream {
    inner: TcpStream,
    peer: SocketAddr,
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl NetStream {
    /// Wrap an accepted or connected std stream.
    pub(crate) fn from_tcp(inner: TcpStream, peer: SocketAddr) -> Self {
        Self { inner, peer }
    }

    /// Connect to a listening stream source (blocking).
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let label = format!("{addr:?}");
        let inner = TcpStream::connect(&addr).map_err(|source| TransportError::Connect {
            addr: label.clone(),
            source,
        })?;
        let peer = inner.peer_addr().map_err(|source| TransportError::Connect {
            addr: label,
            source,
        })?;
        debug!(%peer, "connected to stream source");
        Ok(Self::from_tcp(inner, peer))
    }

    /// Connect with an upper bound on the handshake time.
    pub fn connect_timeout(addr: &SocketAddr, timeout: Duration) -> Result<Self> {
        let inner =
            TcpStream::connect_timeout(addr, timeout).map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        debug!(peer = %addr, "connected to stream source");
        Ok(Self::from_tcp(inner, *addr))
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_tcp(cloned, self.peer))
    }

    /// Shut down both directions of the socket.
    ///
    /// A thread blocked in `read` on any clone of this stream returns with
    /// `Ok(0)` or an error. Shutting down an already closed socket is not an
    /// error.
    pub fn shutdown(&self) {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => debug!(peer = %self.peer, "stream shut down"),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => {}
            Err(err) => debug!(peer = %self.peer, error = %err, "stream shutdown failed"),
        }
    }
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
