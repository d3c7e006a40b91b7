//! End-to-end: real loopback sockets through a controller into a consumer.

use std::io::Write;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use framecast_receiver::{
    channel, Command, ConsumerError, ConsumerLoop, Controller, DatagramConfig, DatagramSource,
    Frame, FrameConsumer, LifecycleState, StreamConfig, StreamSource,
};

#[derive(Default)]
struct Screen {
    frames: Vec<Frame>,
    indicator: bool,
    applied: Arc<AtomicUsize>,
}

impl FrameConsumer for Screen {
    fn on_frame(&mut self, frame: Frame) -> Result<(), ConsumerError> {
        if frame.len() < 4 {
            return Err(ConsumerError::Decode(format!("{} byte frame", frame.len())));
        }
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.frames.push(frame);
        Ok(())
    }

    fn on_command(&mut self, command: Command) -> Result<(), ConsumerError> {
        self.indicator = command == Command::Enable;
        Ok(())
    }
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().expect("valid addr")
}

fn controller_for(queue: framecast_receiver::ActionQueue<Screen>) -> Controller<Screen> {
    let poll = Duration::from_millis(10);
    Controller::new(queue)
        .with_source(StreamSource::new(
            StreamConfig::new(loopback()).with_poll_interval(poll),
        ))
        .with_source(DatagramSource::new(
            DatagramConfig::new(loopback()).with_poll_interval(poll),
        ))
}

fn addr_of(controller: &Controller<Screen>, name: &str) -> SocketAddr {
    controller
        .local_addrs()
        .into_iter()
        .find(|(source, _)| *source == name)
        .map(|(_, addr)| addr)
        .expect("source should be bound")
}

fn drain_until(consumer: &mut ConsumerLoop<Screen>, mut done: impl FnMut(&Screen) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(consumer.context()) && Instant::now() < deadline {
        consumer.wait_and_drain(Duration::from_millis(20));
    }
}

/// A PNG-like 1006-byte image: 8-byte signature, filler, `FF D9` at the end.
fn png_like_frame() -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.resize(1004, 0x5A);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

#[test]
fn three_chunk_frame_arrives_once_and_intact() {
    let (queue, mut consumer) = channel(Screen::default());
    let mut controller = controller_for(queue);
    controller.start().expect("controller should start");
    let tcp = addr_of(&controller, "tcp");

    let frame = png_like_frame();
    assert_eq!(frame.len(), 1006);
    let mut client = TcpStream::connect(tcp).expect("client should connect");
    for chunk in [&frame[..400], &frame[400..800], &frame[800..]] {
        client.write_all(chunk).expect("write should succeed");
        thread::sleep(Duration::from_millis(25));
    }

    drain_until(&mut consumer, |screen| !screen.frames.is_empty());
    thread::sleep(Duration::from_millis(50));
    consumer.drain_all();

    let screen = consumer.context();
    assert_eq!(screen.frames.len(), 1);
    assert_eq!(screen.frames[0].as_bytes(), frame.as_slice());
    assert_eq!(screen.frames[0].format(), framecast_frame::FrameFormat::Png);

    controller.shutdown();
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[test]
fn datagram_commands_toggle_indicator_and_frames_render() {
    let (queue, mut consumer) = channel(Screen::default());
    let mut controller = controller_for(queue);
    controller.start().expect("controller should start");
    let udp = addr_of(&controller, "udp");

    let sender = UdpSocket::bind(loopback()).expect("sender should bind");
    sender.send_to(b"START", udp).expect("send should succeed");
    drain_until(&mut consumer, |screen| screen.indicator);
    assert!(consumer.context().indicator);

    sender
        .send_to(&[0xFF, 0xD8, 0xFF, 0xDB, 0x00], udp)
        .expect("send should succeed");
    drain_until(&mut consumer, |screen| screen.frames.len() == 1);
    assert_eq!(consumer.context().frames.len(), 1);

    sender.send_to(b"STOP", udp).expect("send should succeed");
    drain_until(&mut consumer, |screen| !screen.indicator);
    assert!(!consumer.context().indicator);

    controller.shutdown();
}

#[test]
fn malformed_frame_is_counted_and_does_not_stop_the_pipeline() {
    let (queue, mut consumer) = channel(Screen::default());
    let mut controller = controller_for(queue);
    controller.start().expect("controller should start");
    let udp = addr_of(&controller, "udp");

    let sender = UdpSocket::bind(loopback()).expect("sender should bind");
    sender.send_to(b"ab", udp).expect("send should succeed");
    thread::sleep(Duration::from_millis(30));
    sender.send_to(b"abcdef", udp).expect("send should succeed");

    let mut failed = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while consumer.context().frames.is_empty() && Instant::now() < deadline {
        failed += consumer.wait_and_drain(Duration::from_millis(20)).failed;
    }

    assert_eq!(failed, 1);
    assert_eq!(consumer.context().frames.len(), 1);
    controller.shutdown();
}

#[test]
fn no_frame_callback_after_shutdown_with_blocked_connection() {
    let applied = Arc::new(AtomicUsize::new(0));
    let screen = Screen {
        applied: Arc::clone(&applied),
        ..Screen::default()
    };
    let (queue, mut consumer) = channel(screen);
    let mut controller = controller_for(queue);
    controller.start().expect("controller should start");
    let tcp = addr_of(&controller, "tcp");

    // Half a frame leaves the handler blocked in a read.
    let frame = png_like_frame();
    let mut client = TcpStream::connect(tcp).expect("client should connect");
    client.write_all(&frame[..500]).expect("write should succeed");
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    controller.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(controller.state(), LifecycleState::Stopped);

    // The rest of the frame after shutdown must never reach the consumer.
    let _ = client.write_all(&frame[500..]);
    thread::sleep(Duration::from_millis(50));
    let report = consumer.drain_all();

    assert_eq!(report.executed, 0);
    assert_eq!(applied.load(Ordering::SeqCst), 0);
    assert!(consumer.context().frames.is_empty());
}

#[test]
fn frames_queued_before_shutdown_are_discarded() {
    let (queue, mut consumer) = channel(Screen::default());
    let mut controller = controller_for(queue);
    controller.start().expect("controller should start");
    let udp = addr_of(&controller, "udp");

    let sender = UdpSocket::bind(loopback()).expect("sender should bind");
    sender.send_to(b"queued frame", udp).expect("send should succeed");
    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.queue().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(controller.queue().len(), 1);

    controller.shutdown_token().cancel();
    let report = consumer.drain_all();
    assert_eq!(report.discarded, 1);
    assert!(consumer.context().frames.is_empty());

    controller.shutdown();
}

#[test]
fn port_conflict_fails_start_and_leaves_nothing_running() {
    let taken = UdpSocket::bind(loopback()).expect("socket should bind");
    let busy = taken.local_addr().expect("local addr");

    let (queue, consumer) = channel(Screen::default());
    let mut controller = Controller::new(queue)
        .with_source(StreamSource::new(StreamConfig::new(loopback())))
        .with_source(DatagramSource::new(DatagramConfig::new(busy)));

    assert!(controller.start().is_err());
    assert_eq!(controller.state(), LifecycleState::Stopped);
    assert!(controller.local_addrs().is_empty());
    assert!(consumer.is_closed());
}
