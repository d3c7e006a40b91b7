//! TCP receiver: one connection at a time, reassembled into frames.

use std::io::{ErrorKind, Read};
use std::marker::PhantomData;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use framecast_frame::{AssemblerConfig, EndMarker, FrameAssembler, FrameBoundary};
use framecast_transport::{NetStream, StreamListener};
use tracing::{debug, error, info, warn};

use crate::consumer::FrameConsumer;
use crate::error::{ReceiverError, Result};
use crate::queue::ActionQueue;
use crate::shutdown::ShutdownToken;
use crate::source::{dispatch_frame, lock, FrameSource};

/// Port used by both receivers unless configured otherwise.
pub const DEFAULT_PORT: u16 = 12345;

/// Accept-loop tick and datagram read timeout.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest single read from a connection.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

const SOURCE_NAME: &str = "tcp";

/// What to do with a new peer while another connection is being served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPolicy {
    /// Close the current connection and serve the newcomer.
    #[default]
    Replace,
    /// Keep the current connection and close the newcomer.
    Reject,
}

impl std::str::FromStr for ConnectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown connection policy '{other}' (expected replace or reject)"
            )),
        }
    }
}

/// Configuration for a [`StreamSource`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Address to listen on. Default: `0.0.0.0:12345`.
    pub addr: SocketAddr,
    /// Sleep between accept polls. Default: 100ms.
    pub poll_interval: Duration,
    /// Read buffer size per connection. Default: 4096.
    pub read_chunk_size: usize,
    /// Handling of a second concurrent peer. Default: replace.
    pub policy: ConnectionPolicy,
    /// Frame boundary detection. Default: JPEG end marker.
    pub boundary: Arc<dyn FrameBoundary>,
    /// Assembler limits.
    pub assembler: AssemblerConfig,
}

impl StreamConfig {
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

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    pub fn with_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_boundary(mut self, boundary: Arc<dyn FrameBoundary>) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.assembler.max_frame_size = max_frame_size;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            policy: ConnectionPolicy::default(),
            boundary: Arc::new(EndMarker::jpeg()),
            assembler: AssemblerConfig::default(),
        }
    }
}

/// One accepted peer, owned by its handler thread.
///
/// Once closed it is never read again.
pub struct Connection {
    id: u64,
    stream: NetStream,
    peer: SocketAddr,
    connected: bool,
}

impl Connection {
    fn new(id: u64, stream: NetStream) -> Self {
        let peer = stream.peer_addr();
        Self {
            id,
            stream,
            peer,
            connected: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.connected {
            return Ok(0);
        }
        self.stream.read(buf)
    }

    /// Shut the socket down in both directions. Idempotent.
    pub fn close(&mut self) {
        if self.connected {
            self.connected = false;
            self.stream.shutdown();
            debug!(conn = self.id, peer = %self.peer, "connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("connected", &self.connected)
            .finish()
    }
}

/// The connection currently served, as seen from outside its handler.
struct ActiveConnection {
    id: u64,
    peer: SocketAddr,
    closer: NetStream,
    assembler: Arc<Mutex<FrameAssembler>>,
    handler: JoinHandle<()>,
}

impl ActiveConnection {
    /// Unblock the handler's read and wait for it to exit.
    fn close(self) {
        self.closer.shutdown();
        if self.handler.join().is_err() {
            error!(conn = self.id, "connection handler panicked");
        }
    }
}

type ActiveSlot = Arc<Mutex<Option<ActiveConnection>>>;

struct Running {
    stop: ShutdownToken,
    accept: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// TCP frame source.
///
/// An accept thread polls a non-blocking listener every
/// [`StreamConfig::poll_interval`]. Each accepted peer is served by its own
/// handler thread that reads chunks, feeds them to a [`FrameAssembler`] under
/// a lock, and queues `on_frame` for every completed frame. At most one
/// connection is served at a time; see [`ConnectionPolicy`].
pub struct StreamSource<C> {
    config: StreamConfig,
    active: ActiveSlot,
    running: Option<Running>,
    _consumer: PhantomData<fn(C)>,
}

impl<C> StreamSource<C> {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            active: Arc::new(Mutex::new(None)),
            running: None,
            _consumer: PhantomData,
        }
    }

    /// Listen on `addr` with default settings.
    pub fn bind_to(addr: SocketAddr) -> Self {
        Self::new(StreamConfig::new(addr))
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Peer of the connection being served, if any.
    pub fn connected_peer(&self) -> Option<SocketAddr> {
        lock(&self.active).as_ref().map(|active| active.peer)
    }

    /// Bytes buffered towards the next frame on the active connection.
    pub fn pending_bytes(&self) -> usize {
        lock(&self.active)
            .as_ref()
            .map_or(0, |active| lock(&active.assembler).buffered_len())
    }

    fn halt(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.cancel();
        if running.accept.join().is_err() {
            error!("stream accept thread panicked");
        }
        // Normally the accept thread already closed it.
        close_active(&self.active);
        info!(local_addr = %running.local_addr, "stream source stopped");
    }
}

impl<C: FrameConsumer> FrameSource<C> for StreamSource<C> {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn start(&mut self, queue: ActionQueue<C>) -> Result<()> {
        if self.running.is_some() {
            return Err(ReceiverError::AlreadyStarted(SOURCE_NAME));
        }

        let listener = StreamListener::bind(self.config.addr)?;
        let local_addr = listener.local_addr();
        let stop = ShutdownToken::new();

        let acceptor = Acceptor {
            listener,
            queue,
            config: self.config.clone(),
            stop: stop.clone(),
            active: Arc::clone(&self.active),
            next_id: 1,
        };
        let accept = thread::Builder::new()
            .name("framecast-tcp-accept".to_string())
            .spawn(move || acceptor.run())
            .map_err(|source| ReceiverError::Spawn {
                name: "tcp accept".to_string(),
                source,
            })?;

        self.running = Some(Running {
            stop,
            accept,
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

impl<C> Drop for StreamSource<C> {
    fn drop(&mut self) {
        self.halt();
    }
}

impl<C> std::fmt::Debug for StreamSource<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("config", &self.config)
            .field("local_addr", &self.running.as_ref().map(|r| r.local_addr))
            .finish()
    }
}

fn close_active(active: &Mutex<Option<ActiveConnection>>) {
    let current = lock(active).take();
    if let Some(current) = current {
        current.close();
    }
}

/// State moved into the accept thread.
struct Acceptor<C> {
    listener: StreamListener,
    queue: ActionQueue<C>,
    config: StreamConfig,
    stop: ShutdownToken,
    active: ActiveSlot,
    next_id: u64,
}

impl<C: FrameConsumer> Acceptor<C> {
    fn run(mut self) {
        while !self.stop.is_cancelled() && !self.queue.is_closed() {
            match self.listener.poll_accept() {
                Ok(Some(stream)) => self.admit(stream),
                Ok(None) => {
                    self.reap_finished();
                    thread::sleep(self.config.poll_interval);
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    thread::sleep(self.config.poll_interval);
                }
            }
        }

        close_active(&self.active);
        debug!(local_addr = %self.listener.local_addr(), "accept loop exited");
    }

    fn reap_finished(&self) {
        let finished = {
            let mut active = lock(&self.active);
            if active.as_ref().is_some_and(|c| c.handler.is_finished()) {
                active.take()
            } else {
                None
            }
        };
        if let Some(finished) = finished {
            finished.close();
        }
    }

    fn admit(&mut self, stream: NetStream) {
        let id = self.next_id;
        self.next_id += 1;
        let peer = stream.peer_addr();

        self.reap_finished();
        if lock(&self.active).is_some() {
            match self.config.policy {
                ConnectionPolicy::Reject => {
                    info!(conn = id, %peer, "rejecting connection while another is active");
                    stream.shutdown();
                    return;
                }
                ConnectionPolicy::Replace => {
                    info!(conn = id, %peer, "replacing active connection");
                    close_active(&self.active);
                }
            }
        }

        let closer = match stream.try_clone() {
            Ok(closer) => closer,
            Err(err) => {
                warn!(conn = id, %peer, error = %err, "failed to clone connection handle");
                stream.shutdown();
                return;
            }
        };

        let assembler = Arc::new(Mutex::new(FrameAssembler::with_config(
            Arc::clone(&self.config.boundary),
            self.config.assembler.clone(),
        )));
        let handler = Handler {
            connection: Connection::new(id, stream),
            assembler: Arc::clone(&assembler),
            queue: self.queue.clone(),
            stop: self.stop.clone(),
            read_chunk_size: self.config.read_chunk_size,
        };

        let spawned = thread::Builder::new()
            .name(format!("framecast-tcp-{id}"))
            .spawn(move || handler.run());
        match spawned {
            Ok(handle) => {
                info!(conn = id, %peer, "connection accepted");
                *lock(&self.active) = Some(ActiveConnection {
                    id,
                    peer,
                    closer,
                    assembler,
                    handler: handle,
                });
            }
            Err(err) => {
                error!(conn = id, %peer, error = %err, "failed to spawn connection handler");
                closer.shutdown();
            }
        }
    }
}

/// State moved into a connection handler thread.
struct Handler<C> {
    connection: Connection,
    assembler: Arc<Mutex<FrameAssembler>>,
    queue: ActionQueue<C>,
    stop: ShutdownToken,
    read_chunk_size: usize,
}

impl<C: FrameConsumer> Handler<C> {
    fn run(mut self) {
        let id = self.connection.id();
        let mut buf = vec![0u8; self.read_chunk_size.max(1)];
        let mut frames = Vec::new();

        while self.connection.is_connected() {
            let n = match self.connection.read(&mut buf) {
                Ok(0) => {
                    debug!(conn = id, "peer closed connection");
                    break;
                }
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    if !self.stopping() {
                        warn!(conn = id, error = %err, "connection read failed");
                    }
                    break;
                }
            };
            if self.stopping() {
                break;
            }

            let fed = lock(&self.assembler).feed(&buf[..n], &mut frames);
            if let Err(err) = fed {
                // The assembler already dropped the partial frame.
                warn!(conn = id, error = %err, "frame assembly failed");
            }

            for frame in frames.drain(..) {
                if !dispatch_frame(&self.queue, frame, SOURCE_NAME) {
                    self.connection.close();
                    break;
                }
            }
        }

        self.connection.close();
        lock(&self.assembler).reset();
    }

    fn stopping(&self) -> bool {
        self.stop.is_cancelled() || self.queue.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpStream;
    use std::time::Instant;

    use framecast_frame::{Frame, LengthPrefixed, JPEG_END_MARKER};

    use super::*;
    use crate::error::ConsumerError;
    use crate::queue::{channel, ConsumerLoop};

    #[derive(Default)]
    struct Frames(Vec<Frame>);

    impl FrameConsumer for Frames {
        fn on_frame(&mut self, frame: Frame) -> std::result::Result<(), ConsumerError> {
            self.0.push(frame);
            Ok(())
        }
    }

    fn loopback_config() -> StreamConfig {
        StreamConfig::new("127.0.0.1:0".parse().expect("valid addr"))
            .with_poll_interval(Duration::from_millis(10))
    }

    fn jpeg_frame(len: usize, fill: u8) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len - 2, fill);
        bytes.extend_from_slice(&JPEG_END_MARKER);
        bytes
    }

    fn wait_for_frames(consumer: &mut ConsumerLoop<Frames>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while consumer.context().0.len() < count && Instant::now() < deadline {
            consumer.wait_and_drain(Duration::from_millis(20));
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Replace".parse::<ConnectionPolicy>(), Ok(ConnectionPolicy::Replace));
        assert_eq!("reject".parse::<ConnectionPolicy>(), Ok(ConnectionPolicy::Reject));
        assert!("drop".parse::<ConnectionPolicy>().is_err());
    }

    #[test]
    fn reassembles_frames_split_across_writes() {
        let (queue, mut consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config());
        source.start(queue).expect("source should start");
        let addr = source.local_addr().expect("bound address");

        let frame = jpeg_frame(1006, 0x11);
        let mut client = TcpStream::connect(addr).expect("client should connect");
        for chunk in [&frame[..400], &frame[400..800], &frame[800..]] {
            client.write_all(chunk).expect("write should succeed");
            client.flush().expect("flush should succeed");
            thread::sleep(Duration::from_millis(20));
        }

        wait_for_frames(&mut consumer, 1);
        assert_eq!(consumer.context().0.len(), 1);
        assert_eq!(consumer.context().0[0].as_bytes(), frame.as_slice());

        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn pending_bytes_tracks_partial_frame() {
        let (queue, _consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config());
        source.start(queue).expect("source should start");
        let addr = source.local_addr().expect("bound address");

        let mut client = TcpStream::connect(addr).expect("client should connect");
        client.write_all(&[0x42; 300]).expect("write should succeed");

        assert!(wait_until(|| source.pending_bytes() == 300));
        assert!(source.connected_peer().is_some());

        drop(client);
        assert!(wait_until(|| source.pending_bytes() == 0));
        source.stop();
    }

    #[test]
    fn replace_policy_serves_newest_peer() {
        let (queue, mut consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config());
        source.start(queue).expect("source should start");
        let addr = source.local_addr().expect("bound address");

        let mut first = TcpStream::connect(addr).expect("first client should connect");
        first.write_all(&[0x01; 100]).expect("write should succeed");
        assert!(wait_until(|| source.pending_bytes() == 100));
        let first_peer = source.connected_peer();

        let mut second = TcpStream::connect(addr).expect("second client should connect");
        assert!(wait_until(|| source.connected_peer().is_some()
            && source.connected_peer() != first_peer));

        let frame = jpeg_frame(700, 0x22);
        second.write_all(&frame).expect("write should succeed");
        wait_for_frames(&mut consumer, 1);
        assert_eq!(consumer.context().0[0].as_bytes(), frame.as_slice());

        source.stop();
    }

    #[test]
    fn reject_policy_keeps_current_peer() {
        let (queue, mut consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config().with_policy(ConnectionPolicy::Reject));
        source.start(queue).expect("source should start");
        let addr = source.local_addr().expect("bound address");

        let mut first = TcpStream::connect(addr).expect("first client should connect");
        assert!(wait_until(|| source.connected_peer().is_some()));
        let first_peer = source.connected_peer();

        let _second = TcpStream::connect(addr).expect("second client should connect");
        thread::sleep(Duration::from_millis(100));
        assert_eq!(source.connected_peer(), first_peer);

        let frame = jpeg_frame(800, 0x33);
        first.write_all(&frame).expect("write should succeed");
        wait_for_frames(&mut consumer, 1);
        assert_eq!(consumer.context().0.len(), 1);

        source.stop();
    }

    #[test]
    fn accepts_next_peer_after_disconnect() {
        let (queue, mut consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config());
        source.start(queue).expect("source should start");
        let addr = source.local_addr().expect("bound address");

        for fill in [0x44, 0x55] {
            let mut client = TcpStream::connect(addr).expect("client should connect");
            client
                .write_all(&jpeg_frame(600, fill))
                .expect("write should succeed");
            drop(client);
            thread::sleep(Duration::from_millis(50));
        }

        wait_for_frames(&mut consumer, 2);
        assert_eq!(consumer.context().0.len(), 2);
        source.stop();
    }

    #[test]
    fn length_prefixed_boundary() {
        let boundary: Arc<dyn FrameBoundary> = Arc::new(LengthPrefixed::default());
        let (queue, mut consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config().with_boundary(Arc::clone(&boundary)));
        source.start(queue).expect("source should start");
        let addr = source.local_addr().expect("bound address");

        let mut client = TcpStream::connect(addr).expect("client should connect");
        let mut writer = framecast_frame::FrameWriter::with_boundary(&mut client, boundary);
        writer.send(b"tiny").expect("send should succeed");
        writer.send(b"").expect("send should succeed");

        wait_for_frames(&mut consumer, 2);
        let payloads: Vec<&[u8]> = consumer.context().0.iter().map(Frame::as_bytes).collect();
        assert_eq!(payloads, vec![&b"tiny"[..], &b""[..]]);
        source.stop();
    }

    #[test]
    fn stop_unblocks_idle_connection() {
        let (queue, _consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config());
        source.start(queue).expect("source should start");
        let addr = source.local_addr().expect("bound address");

        let _client = TcpStream::connect(addr).expect("client should connect");
        assert!(wait_until(|| source.connected_peer().is_some()));

        let start = Instant::now();
        source.stop();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(source.connected_peer(), None);
        assert_eq!(source.local_addr(), None);

        source.stop();
    }

    #[test]
    fn second_start_is_rejected() {
        let (queue, _consumer) = channel(Frames::default());
        let mut source = StreamSource::<Frames>::new(loopback_config());
        source.start(queue.clone()).expect("source should start");
        let err = source.start(queue).expect_err("second start should fail");
        assert!(matches!(err, ReceiverError::AlreadyStarted("tcp")));
    }
}
