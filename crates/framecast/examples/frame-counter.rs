//! Minimal receiver: counts frames per second on the main thread.
//!
//! Run with:
//!   cargo run --example frame-counter
//!
//! In another terminal:
//!   cargo run --features cli -- send --udp 127.0.0.1:12345 --command start
//!   cargo run --features cli -- send --tcp 127.0.0.1:12345 --file image.jpg --repeat 30 --interval 33ms

use std::time::{Duration, Instant};

use framecast::receiver::{
    channel, Command, ConsumerError, Controller, DatagramSource, Frame, FrameConsumer,
    ShutdownToken, StreamSource, DEFAULT_PORT,
};

struct Counter {
    frames: u64,
    bytes: usize,
    recording: bool,
}

impl FrameConsumer for Counter {
    fn on_frame(&mut self, frame: Frame) -> Result<(), ConsumerError> {
        self.frames += 1;
        self.bytes += frame.len();
        Ok(())
    }

    fn on_command(&mut self, command: Command) -> Result<(), ConsumerError> {
        self.recording = command == Command::Enable;
        eprintln!("indicator {}", if self.recording { "on" } else { "off" });
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT));
    let (queue, mut consumer) = channel(Counter {
        frames: 0,
        bytes: 0,
        recording: false,
    });

    let mut controller = Controller::new(queue)
        .with_source(StreamSource::bind_to(addr))
        .with_source(DatagramSource::bind_to(addr));
    controller.start()?;
    eprintln!("Listening on {addr} (tcp + udp) for one minute");

    let token = controller.shutdown_token();
    stop_after(Duration::from_secs(60), token.clone());

    let mut window = Instant::now();
    while !token.is_cancelled() {
        consumer.wait_and_drain(Duration::from_millis(16));
        if window.elapsed() >= Duration::from_secs(1) {
            let counter = consumer.context_mut();
            eprintln!("{} frames/s, {} bytes", counter.frames, counter.bytes);
            counter.frames = 0;
            counter.bytes = 0;
            window = Instant::now();
        }
    }

    controller.shutdown();
    Ok(())
}

fn stop_after(delay: Duration, token: ShutdownToken) {
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        token.cancel();
    });
}
