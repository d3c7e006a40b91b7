use std::fs;
use std::path::{Path, PathBuf};

use framecast_frame::Frame;
use framecast_receiver::{
    channel_with_config, Command, ConsumerError, Controller, DatagramConfig, DatagramSource,
    FrameConsumer, QueueConfig, ShutdownToken, StreamConfig, StreamSource,
};
use tracing::{debug, info};

use crate::cmd::{parse_duration, resolve_addr, ListenArgs};
use crate::exit::{io_error, receiver_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_command, print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    if args.no_tcp && args.no_udp {
        return Err(CliError::new(USAGE, "--no-tcp and --no-udp leave nothing to listen on"));
    }
    let tick = parse_duration(&args.tick)?;
    if let Some(dir) = &args.save_dir {
        fs::create_dir_all(dir)
            .map_err(|err| io_error(&format!("failed creating {}", dir.display()), err))?;
    }

    let recorder = FrameRecorder::new(format, args.save_dir.clone(), args.count);
    let queue_config = QueueConfig {
        capacity: args.queue_capacity,
    };
    let (queue, mut consumer) = channel_with_config(recorder, queue_config);
    let token = consumer.shutdown_token();
    consumer.context_mut().stop_with(token.clone());

    let mut controller = Controller::new(queue);
    if !args.no_tcp {
        let config = StreamConfig::new(resolve_addr(&args.tcp)?)
            .with_policy(args.policy)
            .with_boundary(args.framing.boundary())
            .with_max_frame_size(args.framing.max_frame_size);
        controller
            .add_source(StreamSource::new(config))
            .map_err(|err| receiver_error("tcp setup failed", err))?;
    }
    if !args.no_udp {
        let config =
            DatagramConfig::new(resolve_addr(&args.udp)?).with_parse_commands(!args.no_commands);
        controller
            .add_source(DatagramSource::new(config))
            .map_err(|err| receiver_error("udp setup failed", err))?;
    }

    install_ctrlc_handler(token)?;
    controller
        .start()
        .map_err(|err| receiver_error("start failed", err))?;
    for (source, local_addr) in controller.local_addrs() {
        info!(source, %local_addr, "listening");
    }

    let report = consumer.run(tick);
    controller.shutdown();

    info!(
        handled = report.executed,
        failed = report.failed,
        discarded = report.discarded,
        frames = consumer.context().frames,
        "listener stopped"
    );
    Ok(SUCCESS)
}

/// Consumer for the listen command: prints every event and optionally
/// writes frames to disk.
struct FrameRecorder {
    format: OutputFormat,
    save_dir: Option<PathBuf>,
    limit: Option<u64>,
    stop: Option<ShutdownToken>,
    seq: u64,
    frames: u64,
    indicator: bool,
}

impl FrameRecorder {
    fn new(format: OutputFormat, save_dir: Option<PathBuf>, limit: Option<u64>) -> Self {
        Self {
            format,
            save_dir,
            limit,
            stop: None,
            seq: 0,
            frames: 0,
            indicator: false,
        }
    }

    /// Cancel `token` once the frame limit is reached.
    fn stop_with(&mut self, token: ShutdownToken) {
        self.stop = Some(token);
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

impl FrameConsumer for FrameRecorder {
    fn on_frame(&mut self, frame: Frame) -> Result<(), ConsumerError> {
        let seq = self.next_seq();
        let saved = self
            .save_dir
            .as_deref()
            .map(|dir| save_frame(dir, seq, &frame));

        let (path, error) = match &saved {
            Some(Ok(path)) => (Some(path.as_path()), None),
            Some(Err(err)) => (None, Some(err.to_string())),
            None => (None, None),
        };
        print_frame(&frame, seq, path, error.as_deref(), self.format);

        self.frames += 1;
        if self.limit.is_some_and(|limit| self.frames >= limit) {
            if let Some(stop) = &self.stop {
                stop.cancel();
            }
        }

        match saved {
            Some(Err(err)) => Err(ConsumerError::Apply(format!("saving frame {seq}: {err}"))),
            _ => Ok(()),
        }
    }

    fn on_command(&mut self, command: Command) -> Result<(), ConsumerError> {
        let seq = self.next_seq();
        self.indicator = command == Command::Enable;
        debug!(indicator = self.indicator, "indicator updated");
        print_command(command, seq, self.format);
        Ok(())
    }
}

fn save_frame(dir: &Path, seq: u64, frame: &Frame) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("frame-{seq:06}.{}", frame.format().as_str()));
    fs::write(&path, frame.as_bytes())?;
    Ok(path)
}

fn install_ctrlc_handler(token: ShutdownToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        token.cancel();
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
