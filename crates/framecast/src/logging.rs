use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Shape of the diagnostic lines written to stderr. Frame and command
/// events themselves go to stdout through `output`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, event fields flattened to the top level.
    Json,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    /// Adds per-frame and per-datagram lines.
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the stderr subscriber.
///
/// Receiver work happens on named threads (`framecast-tcp-accept`,
/// `framecast-tcp-<id>`, `framecast-udp`), so every line carries the thread
/// name. A second call is a no-op.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::from(level))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_increasing_verbosity() {
        let filters: Vec<LevelFilter> = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
        .into_iter()
        .map(LevelFilter::from)
        .collect();

        assert!(filters.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(LevelFilter::from(LogLevel::default()), LevelFilter::INFO);
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_logging(LogFormat::Json, LogLevel::Error);
        init_logging(LogFormat::Text, LogLevel::Trace);
    }
}
