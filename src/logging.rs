//! Log dispatch construction
//!
//! Binaries build one [`Dispatch`] from their command line and run under it
//! with `tracing::dispatcher::with_default`. Logs always go to stderr so
//! stdout stays free for program output.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

/// Log line format
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Minimum level when `RUST_LOG` does not say otherwise
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Build a stderr subscriber; `RUST_LOG` directives refine `level`
pub fn build_dispatch(format: LogFormat, level: LogLevel) -> Dispatch {
    let filter = EnvFilter::builder()
        .with_default_directive(level.as_filter().into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Text => Dispatch::new(builder.finish()),
        LogFormat::Json => Dispatch::new(builder.json().finish()),
    }
}
