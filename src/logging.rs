use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LogArgs;
use crate::error::{Result, VerbumError};

const DEFAULT_DIRECTIVE: &str = "info";

/// Where logs go when no `--log-file` is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    /// Drop everything; used while a full-screen terminal UI owns the output.
    Discard,
}

/// Filter directive with precedence: `--log-level`, then `RUST_LOG`, then `info`.
pub fn filter_directive(flag: Option<&str>, env: Option<String>) -> String {
    flag.map(str::to_string)
        .filter(|level| !level.trim().is_empty())
        .or_else(|| env.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

/// Install the global `tracing` subscriber.
pub fn init_logging(args: &LogArgs, fallback: LogSink) -> Result<()> {
    let directive = filter_directive(args.level.as_deref(), std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive)
        .map_err(|err| VerbumError::invalid(format!("log filter '{}': {}", directive, err)))?;
    let base_subscriber = Registry::default().with(filter);

    let installed = match (&args.file, fallback) {
        (Some(path), _) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            base_subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
        }
        (None, LogSink::Stderr) => base_subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        (None, LogSink::Discard) => base_subscriber
            .with(fmt::layer().with_writer(std::io::sink))
            .try_init(),
    };

    installed.map_err(|err| VerbumError::invalid(format!("logging already initialized: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_beats_environment() {
        assert_eq!(filter_directive(Some("debug"), Some("warn".to_string())), "debug");
        assert_eq!(filter_directive(None, Some("verbum=trace".to_string())), "verbum=trace");
        assert_eq!(filter_directive(None, None), "info");
        assert_eq!(filter_directive(Some(" "), Some(String::new())), "info");
    }
}
