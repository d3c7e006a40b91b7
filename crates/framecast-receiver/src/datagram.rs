//! UDP receiver: every datagram is one frame or one control command.

use std::marker::PhantomData;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use framecast_frame::Frame;
use framecast_transport::{DatagramSocket, MAX_DATAGRAM_SIZE};
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::consumer::FrameConsumer;
use crate::error::{ReceiverError, Result};
use crate::queue::ActionQueue;
use crate::shutdown::ShutdownToken;
use crate::source::{dispatch_command, dispatch_frame, FrameSource};
use crate::stream::{DEFAULT_POLL_INTERVAL, DEFAULT_PORT};

/// Wait before re-binding after a receive error.
pub const DEFAULT_REBIND_DELAY: Duration = Duration::from_millis(500);

const SOURCE_NAME: &str = "udp";

/// Configuration for a [`DatagramSource`].
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// Address to bind. Default: `0.0.0.0:12345`.
    pub addr: SocketAddr,
    /// Socket read timeout; bounds how long shutdown waits. Default: 100ms.
    pub poll_interval: Duration,
    /// Pause between a receive error and the re-bind. Default: 500ms.
    pub rebind_delay: Duration,
    /// Give up after this many consecutive failed re-binds. Default: never.
    pub max_rebind_attempts: Option<u32>,
    /// Treat `START` / `STOP` payloads as commands. Default: true.
    pub parse_commands: bool,
    /// Larger datagrams are dropped. Default: 65507.
    pub max_datagram_size: usize,
}

impl DatagramConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_rebind_delay(mut self, delay: Duration) -> Self {
        self.rebind_delay = delay;
        self
    }

    pub fn with_max_rebind_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_rebind_attempts = attempts;
        self
    }

    pub fn with_parse_commands(mut self, parse: bool) -> Self {
        self.parse_commands = parse;
        self
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            rebind_delay: DEFAULT_REBIND_DELAY,
            max_rebind_attempts: None,
            parse_commands: true,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

struct Running {
    stop: ShutdownToken,
    worker: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// UDP frame source.
///
/// A single thread receives datagrams in arrival order. No reassembly takes
/// place: each datagram is either a [`Command`] or a whole [`Frame`]. After a
/// receive error the socket is dropped and bound again to the same address.
pub struct DatagramSource<C> {
    config: DatagramConfig,
    running: Option<Running>,
    _consumer: PhantomData<fn(C)>,
}

impl<C> DatagramSource<C> {
    pub fn new(config: DatagramConfig) -> Self {
        Self {
            config,
            running: None,
            _consumer: PhantomData,
        }
    }

    /// Listen on `addr` with default settings.
    pub fn bind_to(addr: SocketAddr) -> Self {
        Self::new(DatagramConfig::new(addr))
    }

    pub fn config(&self) -> &DatagramConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn halt(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.cancel();
        if running.worker.join().is_err() {
            error!("datagram receive thread panicked");
        }
        info!(local_addr = %running.local_addr, "datagram source stopped");
    }
}

impl<C: FrameConsumer> FrameSource<C> for DatagramSource<C> {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn start(&mut self, queue: ActionQueue<C>) -> Result<()> {
        if self.running.is_some() {
            return Err(ReceiverError::AlreadyStarted(SOURCE_NAME));
        }

        let socket = bind_socket(self.config.addr, self.config.poll_interval)?;
        let local_addr = socket.local_addr();
        let stop = ShutdownToken::new();

        let receiver = Receiver {
            socket: Some(socket),
            local_addr,
            queue,
            config: self.config.clone(),
            stop: stop.clone(),
        };
        let worker = thread::Builder::new()
            .name("framecast-udp".to_string())
            .spawn(move || receiver.run())
            .map_err(|source| ReceiverError::Spawn {
                name: "udp receive".to_string(),
                source,
            })?;

        self.running = Some(Running {
            stop,
            worker,
            local_addr,
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.halt();
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }
}

impl<C> Drop for DatagramSource<C> {
    fn drop(&mut self) {
        self.halt();
    }
}

impl<C> std::fmt::Debug for DatagramSource<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSource")
            .field("config", &self.config)
            .field("local_addr", &self.running.as_ref().map(|r| r.local_addr))
            .finish()
    }
}

fn bind_socket(addr: SocketAddr, poll_interval: Duration) -> Result<DatagramSocket> {
    let socket = DatagramSocket::bind(addr)?;
    socket.set_read_timeout(Some(poll_interval.max(Duration::from_millis(1))))?;
    Ok(socket)
}

/// State moved into the receive thread.
struct Receiver<C> {
    socket: Option<DatagramSocket>,
    local_addr: SocketAddr,
    queue: ActionQueue<C>,
    config: DatagramConfig,
    stop: ShutdownToken,
}

impl<C: FrameConsumer> Receiver<C> {
    fn run(mut self) {
        // One spare byte so an oversized datagram is seen as oversized
        // rather than silently truncated to the limit.
        let mut buf = vec![0u8; self.config.max_datagram_size.saturating_add(1)];

        while !self.stopping() {
            let Some(socket) = self.socket.as_ref() else {
                if !self.rebind() {
                    break;
                }
                continue;
            };

            match socket.recv(&mut buf) {
                Ok(None) => {}
                Ok(Some((len, from))) => {
                    if !self.dispatch(&buf[..len], from) {
                        break;
                    }
                }
                Err(err) => {
                    if self.stopping() {
                        break;
                    }
                    warn!(error = %err, local_addr = %self.local_addr, "datagram receive failed");
                    self.socket = None;
                }
            }
        }

        debug!(local_addr = %self.local_addr, "datagram receive loop exited");
    }

    /// Bind again after a receive error. Returns `false` when the loop should
    /// end, either on shutdown or after the configured number of failures.
    fn rebind(&mut self) -> bool {
        let mut attempts = 0u32;
        loop {
            if let Some(max) = self.config.max_rebind_attempts {
                if attempts >= max {
                    error!(
                        local_addr = %self.local_addr,
                        attempts,
                        "giving up on datagram socket"
                    );
                    return false;
                }
            }
            if !self
                .stop
                .sleep(self.config.rebind_delay, self.config.poll_interval)
                || self.queue.is_closed()
            {
                return false;
            }
            attempts += 1;

            match bind_socket(self.local_addr, self.config.poll_interval) {
                Ok(socket) => {
                    info!(local_addr = %self.local_addr, attempts, "datagram socket re-bound");
                    self.socket = Some(socket);
                    return true;
                }
                Err(err) => {
                    warn!(local_addr = %self.local_addr, attempts, error = %err, "re-bind failed");
                }
            }
        }
    }

    fn dispatch(&self, payload: &[u8], from: SocketAddr) -> bool {
        if payload.is_empty() {
            debug!(%from, "ignoring empty datagram");
            return true;
        }
        if payload.len() > self.config.max_datagram_size {
            warn!(
                %from,
                len = payload.len(),
                max = self.config.max_datagram_size,
                "dropping oversized datagram"
            );
            return true;
        }

        if self.config.parse_commands {
            if let Some(command) = Command::parse(payload) {
                return dispatch_command(&self.queue, command, SOURCE_NAME);
            }
        }
        dispatch_frame(&self.queue, Frame::copy_from_slice(payload), SOURCE_NAME)
    }

    fn stopping(&self) -> bool {
        self.stop.is_cancelled() || self.queue.is_closed()
    }
}
