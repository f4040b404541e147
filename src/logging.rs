//! Logging setup
//!
//! Events go to two places: a plain-text log file (info, or debug with
//! `--debug`) and stderr filtered by `RUST_LOG`, defaulting to `warn` so the
//! live view stays readable. Per-target outcomes are logged below `warn` and
//! therefore only reach the file.

use console::Term;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Builds the stderr layer
///
/// `ansi` controls colour escapes; pass `false` when the writer is not a
/// colour-capable terminal.
pub fn stderr_layer<S, W>(writer: W, ansi: bool) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_ansi(ansi)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
}

/// Installs the global tracing subscriber
///
/// Failing to open the log file is not fatal: logging continues on stderr
/// only and a warning is emitted.
pub fn init(log_file: &Path, debug_enabled: bool) {
    let ansi = Term::stderr().features().colors_supported();
    let console_layer = stderr_layer(std::io::stderr, ansi);

    let file_level = if debug_enabled { "debug" } else { "info" };
    let file = OpenOptions::new().create(true).append(true).open(log_file);

    match file {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(EnvFilter::new(format!("ssl_checker={}", file_level)));

            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();
            debug!("Logging to {}", log_file.display());
        }
        Err(e) => {
            tracing_subscriber::registry().with(console_layer).init();
            warn!("Failed to open log file {}: {}", log_file.display(), e);
        }
    }
}
