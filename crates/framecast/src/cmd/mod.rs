use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Args, Subcommand, ValueEnum};
use framecast_frame::{EndMarker, FrameBoundary, LengthPrefixed, DEFAULT_MIN_FRAME_SIZE};
use framecast_receiver::ConnectionPolicy;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

const DEFAULT_ADDR: &str = "0.0.0.0:12345";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive frames over TCP and UDP and print them.
    Listen(ListenArgs),
    /// Send image files as frames, or a control command.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// How frame boundaries are found in a TCP byte stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// Frame ends at a JPEG end-of-image marker.
    #[default]
    EndMarker,
    /// Every frame carries a 4-byte big-endian length prefix.
    LengthPrefixed,
}

/// Control command carried in a single datagram.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CommandArg {
    Start,
    Stop,
}

impl From<CommandArg> for framecast_receiver::Command {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Start => Self::Enable,
            CommandArg::Stop => Self::Disable,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FramingArgs {
    /// Frame boundary detection for TCP streams.
    #[arg(long, value_enum, default_value = "end-marker")]
    pub framing: Framing,
    /// End-marker framing: a frame must be longer than this many bytes.
    #[arg(long, default_value_t = DEFAULT_MIN_FRAME_SIZE)]
    pub min_frame_size: usize,
    /// Largest frame accepted or sent, in bytes.
    #[arg(long, default_value_t = framecast_frame::DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl FramingArgs {
    pub fn boundary(&self) -> Arc<dyn FrameBoundary> {
        match self.framing {
            Framing::EndMarker => {
                Arc::new(EndMarker::jpeg().with_min_frame_size(self.min_frame_size))
            }
            Framing::LengthPrefixed => Arc::new(LengthPrefixed::new(self.max_frame_size)),
        }
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// TCP address to listen on.
    #[arg(long, env = "FRAMECAST_TCP_ADDR", default_value = DEFAULT_ADDR)]
    pub tcp: String,
    /// UDP address to listen on.
    #[arg(long, env = "FRAMECAST_UDP_ADDR", default_value = DEFAULT_ADDR)]
    pub udp: String,
    /// Do not start the TCP receiver.
    #[arg(long, conflicts_with = "no_udp")]
    pub no_tcp: bool,
    /// Do not start the UDP receiver.
    #[arg(long)]
    pub no_udp: bool,
    #[command(flatten)]
    pub framing: FramingArgs,
    /// What to do with a second TCP peer (replace or reject).
    #[arg(long, default_value = "replace")]
    pub policy: ConnectionPolicy,
    /// Treat START / STOP datagrams as ordinary frames.
    #[arg(long)]
    pub no_commands: bool,
    /// Bound on queued, not yet handled frames. Default: unbounded.
    #[arg(long)]
    pub queue_capacity: Option<usize>,
    /// Consumer wake-up interval (e.g. 16ms, 1s).
    #[arg(long, default_value = "50ms")]
    pub tick: String,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Write every received frame into this directory.
    #[arg(long, value_name = "DIR", env = "FRAMECAST_SAVE_DIR")]
    pub save_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["tcp", "udp"])))]
pub struct SendArgs {
    /// Stream frames to this TCP address.
    #[arg(long)]
    pub tcp: Option<String>,
    /// Send datagrams to this UDP address.
    #[arg(long)]
    pub udp: Option<String>,
    /// Image file to send as one frame. Repeat for several frames.
    #[arg(long = "file", value_name = "FILE")]
    pub files: Vec<PathBuf>,
    /// Send a control command datagram before any frames (UDP only).
    #[arg(long, value_enum, conflicts_with = "tcp")]
    pub command: Option<CommandArg>,
    #[command(flatten)]
    pub framing: FramingArgs,
    /// Send the file list this many times.
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,
    /// Pause between frames (e.g. 33ms).
    #[arg(long)]
    pub interval: Option<String>,
    /// TCP connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds. Zero is rejected.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Resolve `host:port` to the first matching socket address.
pub fn resolve_addr(input: &str) -> CliResult<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }
    input
        .to_socket_addrs()
        .map_err(|err| CliError::new(USAGE, format!("invalid address {input}: {err}")))?
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("address {input} did not resolve")))
}
