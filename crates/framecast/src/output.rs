use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framecast_frame::Frame;
use framecast_receiver::Command;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    event: &'static str,
    seq: u64,
    format: &'static str,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    timestamp: String,
}

#[derive(Serialize)]
struct CommandOutput {
    event: &'static str,
    seq: u64,
    command: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
struct SendOutput<'a> {
    event: &'static str,
    transport: &'a str,
    target: String,
    frames: usize,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'static str>,
}

/// One received frame. `saved` is where it was written, if anywhere;
/// `error` is why saving failed.
pub fn print_frame(
    frame: &Frame,
    seq: u64,
    saved: Option<&Path>,
    error: Option<&str>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                event: "frame",
                seq,
                format: frame.format().as_str(),
                size: frame.len(),
                saved: saved.map(|path| path.display().to_string()),
                error,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "EVENT", "FORMAT", "SIZE", "SAVED"])
                .add_row(vec![
                    seq.to_string(),
                    "frame".to_string(),
                    frame.format().to_string(),
                    frame.len().to_string(),
                    saved_column(saved, error),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{seq} frame format={} size={} saved={}",
                frame.format(),
                frame.len(),
                saved_column(saved, error)
            );
        }
        OutputFormat::Raw => print_raw(frame.as_bytes()),
    }
}

/// One received control command. Raw output has no representation for it.
pub fn print_command(command: Command, seq: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CommandOutput {
                event: "command",
                seq,
                command: command.as_str(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "EVENT", "COMMAND"])
                .add_row(vec![
                    seq.to_string(),
                    "command".to_string(),
                    command.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("#{seq} command {command}"),
        OutputFormat::Raw => {}
    }
}

pub fn print_send_summary(
    transport: &str,
    target: SocketAddr,
    frames: usize,
    bytes: usize,
    command: Option<Command>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = SendOutput {
                event: "sent",
                transport,
                target: target.to_string(),
                frames,
                bytes,
                command: command.map(Command::as_str),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TRANSPORT", "TARGET", "FRAMES", "BYTES", "COMMAND"])
                .add_row(vec![
                    transport.to_string(),
                    target.to_string(),
                    frames.to_string(),
                    bytes.to_string(),
                    command.map_or_else(|| "-".to_string(), |c| c.to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let command = command.map_or_else(String::new, |c| format!(" command={c}"));
            println!("sent via {transport} to {target}: frames={frames} bytes={bytes}{command}");
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn saved_column(saved: Option<&Path>, error: Option<&str>) -> String {
    match (saved, error) {
        (Some(path), _) => path.display().to_string(),
        (None, Some(error)) => format!("failed: {error}"),
        (None, None) => "-".to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
