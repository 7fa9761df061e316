//! Structured logging via `tracing-subscriber` and `tracing-appender`.
//!
//! The bot (`gastos start`) logs JSON to a daily-rotated file plus
//! human-readable lines on stderr. One-shot subcommands log to stderr only.
//! Both honour `RUST_LOG`; without it, [`DEFAULT_DIRECTIVES`] keeps the
//! HTTP, SQL and Telegram client crates at `warn`.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,teloxide=warn,reqwest=warn,hyper=warn,imap=warn";

/// File name prefix inside the logs directory; the appender adds the date.
pub const LOG_FILE_PREFIX: &str = "gastos.log";

/// Keeps the non-blocking file writer alive. Dropping it flushes pending
/// entries.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// `RUST_LOG` when set and valid, otherwise [`DEFAULT_DIRECTIVES`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the bot's subscriber: JSON lines in
/// `{logs_dir}/gastos.log.YYYY-MM-DD` plus a stderr layer.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_writer(non_blocking);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .context("a tracing subscriber is already installed")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Stderr-only logging for `init`, `status`, `export` and `sweep`. A second
/// call is a no-op.
pub fn init_cli() {
    // Ignored: only fails when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
