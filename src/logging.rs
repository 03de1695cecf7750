//! Tracing subscriber setup shared by the binaries

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LogTarget, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where console output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    /// Keeps stdout free for machine-readable output
    Stderr,
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the program. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig, console: ConsoleStream) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if matches!(config.target, LogTarget::Console | LogTarget::Both) {
        layers.push(match console {
            ConsoleStream::Stdout => format_layer(&config.format, std::io::stdout),
            ConsoleStream::Stderr => format_layer(&config.format, std::io::stderr),
        });
    }

    if matches!(config.target, LogTarget::File | LogTarget::Both) {
        if let Some((writer, file_guard)) = file_writer(config) {
            layers.push(format_layer(&config.format, writer));
            guard = Some(file_guard);
        }
    }

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init();

    guard
}

fn format_layer<W>(format: &LogFormat, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(writer)
            .boxed(),
    }
}

fn file_writer(config: &LoggingConfig) -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            config.log_dir, e
        );
    }

    let rotation = if config.daily_rotation {
        Rotation::DAILY
    } else {
        Rotation::NEVER
    };
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.log_prefix.as_str())
        .filename_suffix("log");
    if config.max_log_files > 0 {
        builder = builder.max_log_files(config.max_log_files);
    }

    match builder.build(&config.log_dir) {
        Ok(appender) => Some(tracing_appender::non_blocking(appender)),
        Err(e) => {
            eprintln!("Warning: File logging disabled: {}", e);
            None
        }
    }
}
