use std::fmt;
use std::io;

use framecast_frame::FrameError;
use framecast_receiver::ReceiverError;
use framecast_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const ADDRESS_IN_USE: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::AddrInUse => ADDRESS_IN_USE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            io_error(context, source)
        }
        TransportError::Accept(source) | TransportError::Io(source) => {
            let mut cli = io_error(context, source);
            if cli.code == INTERNAL {
                cli.code = TRANSPORT_ERROR;
            }
            cli
        }
        TransportError::DatagramTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLarge { .. } | FrameError::NotDelimited { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn receiver_error(context: &str, err: ReceiverError) -> CliError {
    match err {
        ReceiverError::Transport(err) => transport_error(context, err),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_conflict_maps_to_address_in_use() {
        let err = ReceiverError::Transport(TransportError::Bind {
            addr: "0.0.0.0:12345".to_string(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        });
        let cli = receiver_error("start failed", err);
        assert_eq!(cli.code, ADDRESS_IN_USE);
        assert!(cli.message.starts_with("start failed: "));
    }

    #[test]
    fn undelimited_frame_is_invalid_data() {
        let err = FrameError::NotDelimited {
            len: 3,
            boundary: "end-marker",
            reason: "payload does not end with the end marker",
        };
        assert_eq!(frame_error("send failed", err).code, DATA_INVALID);
    }

    #[test]
    fn unclassified_socket_failure_is_a_transport_error() {
        let err = TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(transport_error("send failed", err).code, TRANSPORT_ERROR);

        let err = TransportError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(transport_error("send failed", err).code, PERMISSION_DENIED);
    }
}
