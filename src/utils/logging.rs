//! Logging initialization for ChatRelay.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact `[timestamp] LEVEL target message {fields}` lines;
//!   use the [`log_component!`] macro to add a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// `RUST_LOG` wins over `cfg.level` when set.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use std::sync::Arc;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let file = match &cfg.file {
        Some(path) => Some(Arc::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        )),
        None => None,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (cfg.format, file) {
        (LogFormat::Json, Some(file)) => builder.json().with_writer(file).init(),
        (LogFormat::Json, None) => builder.json().init(),
        (LogFormat::Pretty, Some(file)) => builder.pretty().with_ansi(false).with_writer(file).init(),
        (LogFormat::Pretty, None) => builder.pretty().init(),
        (LogFormat::Component, Some(file)) => builder
            .with_target(true)
            .compact()
            .with_ansi(false)
            .with_writer(file)
            .init(),
        (LogFormat::Component, None) => builder.with_target(true).compact().init(),
    }

    Ok(())
}

/// Emit a component-tagged tracing event.
///
/// ```
/// # use chatrelay::log_component;
/// log_component!(info, "telegram", "message received");
/// log_component!(debug, "dispatch", "history truncated", evicted = 3u64, budget = 4096u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
