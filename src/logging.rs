//! Logging setup: a human-readable console sink at info level, and during an
//! export a JSON sink at debug level written to the run's log file.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::{Error, Result};

fn console_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ptdump=info"))
}

fn console_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter())
}

pub fn init_console() -> Result<()> {
    tracing_subscriber::registry()
        .with(console_layer())
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))
}

/// Installs both sinks. The log file is truncated if it already exists.
pub fn init_with_file(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(log_file)?;

    tracing_subscriber::registry()
        .with(console_layer())
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new("ptdump=debug")),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))
}
