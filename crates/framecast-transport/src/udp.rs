use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{is_timeout_kind, Result, TransportError};

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Bound UDP socket.
///
/// Receives with an optional read timeout; a timeout surfaces as `Ok(None)`
/// from [`DatagramSocket::recv`] so that receive loops can check a shutdown
/// flag between datagrams.
pub struct DatagramSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl DatagramSocket {
    /// Bind to the given address. Port `0` picks a free port.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let label = format!("{addr:?}");
        let socket = UdpSocket::bind(&addr).map_err(|source| TransportError::Bind {
            addr: label.clone(),
            source,
        })?;
        let local_addr = socket.local_addr().map_err(|source| TransportError::Bind {
            addr: label,
            source,
        })?;

        info!(%local_addr, "listening for datagrams");

        Ok(Self { socket, local_addr })
    }

    /// Bind an ephemeral socket suitable for sending to `target`.
    pub fn sender_for(target: &SocketAddr) -> Result<Self> {
        let any: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(any).map_err(|source| TransportError::Bind {
            addr: any.to_string(),
            source,
        })?;
        let local_addr = socket.local_addr()?;
        Ok(Self { socket, local_addr })
    }

    /// Set the receive timeout. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` when the read timeout elapses without data.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => {
                debug!(%from, len, "received datagram");
                Ok(Some((len, from)))
            }
            Err(err) if is_timeout_kind(&err) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Send one datagram to `target`.
    pub fn send_to(&self, payload: &[u8], target: &SocketAddr) -> Result<()> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge {
                size: payload.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        let sent = self.socket.send_to(payload, target)?;
        if sent != payload.len() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short datagram write ({sent} of {} bytes)", payload.len()),
            )));
        }
        Ok(())
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for DatagramSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
