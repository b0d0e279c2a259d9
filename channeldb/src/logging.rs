//! # Structured Logging
//!
//! The store itself only emits `tracing` events. Services embedding it can
//! use these helpers to install a subscriber with `RUST_LOG` filtering and
//! either pretty or JSON output, written to stderr.

use std::io;

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing_subscriber::util::TryInitError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for local development.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive). Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Build a stderr subscriber without installing it.
///
/// `default_level` applies when `RUST_LOG` is unset, e.g.
/// `"info"` or `"nova_channeldb=debug"`. Useful with
/// [`tracing::subscriber::with_default`] to scope logging to one call site.
pub fn subscriber(default_level: &str, format: LogFormat) -> Box<dyn Subscriber + Send + Sync> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    build_subscriber(filter, format, io::stderr)
}

/// Install the global subscriber. Panics if one is already set.
pub fn init_logging(default_level: &str, format: LogFormat) {
    if let Err(e) = try_init_logging(default_level, format) {
        panic!("failed to initialize logging: {e}");
    }
}

/// Like [`init_logging`], but reports an already-installed subscriber as
/// an error instead of panicking.
pub fn try_init_logging(default_level: &str, format: LogFormat) -> Result<(), TryInitError> {
    subscriber(default_level, format).try_init()?;
    tracing::info!(?format, "invoice store logging initialized");
    Ok(())
}

fn build_subscriber<W>(
    filter: EnvFilter,
    format: LogFormat,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => Box::new(
            registry.with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
        ),
        LogFormat::Json => Box::new(
            registry.with(fmt::layer().json().with_writer(writer).with_target(true)),
        ),
    }
}
