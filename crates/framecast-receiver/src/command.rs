//! Short ASCII control messages carried in datagrams.

/// Datagram payload that switches the consumer's indicator on.
pub const START_COMMAND: &[u8] = b"START";

/// Datagram payload that switches the consumer's indicator off.
pub const STOP_COMMAND: &[u8] = b"STOP";

/// A control command decoded from a datagram payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
}

impl Command {
    /// Parse a datagram payload. Surrounding ASCII whitespace is ignored;
    /// anything other than the two literals is not a command.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload.trim_ascii() {
            START_COMMAND => Some(Self::Enable),
            STOP_COMMAND => Some(Self::Disable),
            _ => None,
        }
    }

    /// Wire literal for this command.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Enable => START_COMMAND,
            Self::Disable => STOP_COMMAND,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals() {
        assert_eq!(Command::parse(b"START"), Some(Command::Enable));
        assert_eq!(Command::parse(b"STOP"), Some(Command::Disable));
        assert_eq!(Command::parse(b"STOP\n"), Some(Command::Disable));
        assert_eq!(Command::parse(b" START\r\n"), Some(Command::Enable));
    }

    #[test]
    fn other_payloads_are_not_commands() {
        assert_eq!(Command::parse(b"start"), None);
        assert_eq!(Command::parse(b"STARTED"), None);
        assert_eq!(Command::parse(b""), None);
        assert_eq!(Command::parse(&[0xFF, 0xD8, 0xFF]), None);
    }

    #[test]
    fn wire_literal_round_trips() {
        for command in [Command::Enable, Command::Disable] {
            assert_eq!(Command::parse(command.as_bytes()), Some(command));
        }
    }
}
