//! Subscriber setup for the node binary.
//!
//! Every subcommand logs to stderr. Stdout belongs to the command's own
//! output: `watch` prints one descriptor per line and `reference` prints a
//! bare reference, and scripts read both.
//!
//! `RUST_LOG` wins over the filter passed in by `main`, for example
//! `RUST_LOG=tillpoint_protocol::session=debug,tower_http=debug`.

use std::io;

use clap::ValueEnum;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Colored lines with source locations, for a terminal.
    #[default]
    Pretty,
    /// One JSON object per line, for a log shipper.
    Json,
}

/// The stderr layer for `format`.
fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(io::stderr)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .boxed(),
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(output_layer(format))
        .try_init()?;

    tracing::debug!(?format, "logging ready");
    Ok(())
}
