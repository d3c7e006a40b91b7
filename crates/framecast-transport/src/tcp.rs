use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{is_timeout_kind, Result, TransportError};
use crate::stream::NetStream;

/// Polled TCP listener.
///
/// The listening socket is non-blocking: [`StreamListener::poll_accept`]
/// returns immediately with `None` when no peer is waiting, so the caller can
/// sleep for a fixed tick and check its shutdown flag in between. Accepted
/// streams are switched back to blocking mode.
pub struct StreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl StreamListener {
    /// Bind and listen on the given address.
    ///
    /// Port `0` asks the OS for a free port; use [`StreamListener::local_addr`]
    /// to find out which one was chosen.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let label = format!("{addr:?}");
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            addr: label.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind {
                addr: label.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind {
                addr: label,
                source,
            })?;

        info!(%local_addr, "listening for stream connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept a waiting connection, if any (non-blocking).
    pub fn poll_accept(&self) -> Result<Option<NetStream>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                if let Err(err) = stream.set_nodelay(true) {
                    debug!(%peer, error = %err, "could not disable nagle");
                }
                debug!(%peer, "accepted connection");
                Ok(Some(NetStream::from_tcp(stream, peer)))
            }
            Err(err) if is_timeout_kind(&err) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for StreamListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamListener")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
