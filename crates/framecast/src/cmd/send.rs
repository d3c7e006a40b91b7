use std::fs;
use std::thread;
use std::time::Duration;

use framecast_frame::FrameWriter;
use framecast_receiver::Command;
use framecast_transport::{DatagramSocket, NetStream};
use tracing::debug;

use crate::cmd::{parse_duration, resolve_addr, SendArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_send_summary, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;
    let payloads = read_payloads(&args)?;
    let command = args.command.map(Command::from);
    if payloads.is_empty() && command.is_none() {
        return Err(CliError::new(USAGE, "nothing to send: pass --file or --command"));
    }
    let schedule = Schedule {
        count: payloads.len().saturating_mul(args.repeat),
        interval,
    };

    if let Some(addr) = &args.tcp {
        let target = resolve_addr(addr)?;
        let timeout = parse_duration(&args.connect_timeout)?;
        let stream = NetStream::connect_timeout(&target, timeout)
            .map_err(|err| transport_error("connect failed", err))?;
        let mut writer = FrameWriter::with_boundary(stream, args.framing.boundary());

        let bytes = schedule.run(&payloads, |payload| {
            writer
                .send(payload)
                .map_err(|err| frame_error("send failed", err))
        })?;
        writer.get_ref().shutdown();

        print_send_summary("tcp", target, schedule.count, bytes, None, format);
    } else if let Some(addr) = &args.udp {
        let target = resolve_addr(addr)?;
        let socket = DatagramSocket::sender_for(&target)
            .map_err(|err| transport_error("bind failed", err))?;

        if let Some(command) = command {
            socket
                .send_to(command.as_bytes(), &target)
                .map_err(|err| transport_error("send failed", err))?;
            debug!(%command, %target, "command sent");
            if let Some(interval) = interval {
                thread::sleep(interval);
            }
        }
        let bytes = schedule.run(&payloads, |payload| {
            socket
                .send_to(payload, &target)
                .map_err(|err| transport_error("send failed", err))
        })?;

        print_send_summary("udp", target, schedule.count, bytes, command, format);
    }

    Ok(SUCCESS)
}

fn read_payloads(args: &SendArgs) -> CliResult<Vec<Vec<u8>>> {
    args.files
        .iter()
        .map(|path| {
            fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
        })
        .collect()
}

/// Sends `count` frames cycling through the payload list, pausing between
/// consecutive frames.
struct Schedule {
    count: usize,
    interval: Option<Duration>,
}

impl Schedule {
    /// Returns the number of payload bytes handed to `send`.
    fn run<F>(&self, payloads: &[Vec<u8>], mut send: F) -> CliResult<usize>
    where
        F: FnMut(&[u8]) -> CliResult<()>,
    {
        let mut bytes = 0usize;
        for (index, payload) in payloads.iter().cycle().take(self.count).enumerate() {
            if index > 0 {
                if let Some(interval) = self.interval {
                    thread::sleep(interval);
                }
            }
            send(payload)?;
            bytes = bytes.saturating_add(payload.len());
            debug!(frame = index + 1, len = payload.len(), "frame sent");
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use framecast_frame::{FrameAssembler, FrameBoundary, LengthPrefixed};

    use super::*;

    #[test]
    fn schedule_cycles_payloads() {
        let payloads = vec![b"a".to_vec(), b"bb".to_vec()];
        let schedule = Schedule {
            count: 5,
            interval: None,
        };

        let mut sent = Vec::new();
        let bytes = schedule
            .run(&payloads, |payload| {
                sent.push(payload.to_vec());
                Ok(())
            })
            .expect("schedule should run");

        let expected: Vec<Vec<u8>> = ["a", "bb", "a", "bb", "a"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();
        assert_eq!(sent, expected);
        assert_eq!(bytes, 7);
    }

    #[test]
    fn schedule_stops_at_first_error() {
        let payloads = vec![b"x".to_vec()];
        let schedule = Schedule {
            count: 3,
            interval: Some(Duration::from_millis(1)),
        };

        let mut attempts = 0;
        let err = schedule
            .run(&payloads, |_| {
                attempts += 1;
                Err(CliError::new(USAGE, "refused"))
            })
            .expect_err("schedule should fail");
        assert_eq!(attempts, 1);
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn scheduled_frames_reassemble_on_receiver() {
        let boundary: Arc<dyn FrameBoundary> = Arc::new(LengthPrefixed::default());
        let mut writer =
            FrameWriter::with_boundary(Cursor::new(Vec::<u8>::new()), Arc::clone(&boundary));
        let payloads = vec![b"first".to_vec(), b"second".to_vec()];
        let schedule = Schedule {
            count: 2,
            interval: None,
        };

        schedule
            .run(&payloads, |payload| {
                writer
                    .send(payload)
                    .map_err(|err| frame_error("send failed", err))
            })
            .expect("schedule should run");

        let wire = writer.into_inner().into_inner();
        let mut assembler = FrameAssembler::new(boundary);
        let mut frames = Vec::new();
        assembler.feed(&wire, &mut frames).expect("feed should succeed");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].as_bytes(), b"second");
    }
}
