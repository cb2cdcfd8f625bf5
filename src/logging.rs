//! Structured logging setup.
//!
//! Log lines are emitted with `tracing`; request lines carry a `session_id`
//! field so everything logged for one request can be correlated.
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `SERVANT_LOG_LEVEL` | `trace`..`error` | `info` |
//! | `SERVANT_LOG_FORMAT` | `json`, `pretty` | `pretty` |
//! | `SERVANT_LOG_LOCATION` | `true`/`false` | `false` |
//!
//! `RUST_LOG`, when set, replaces the level filter entirely.

use anyhow::{Context, Result};
use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Append to this file instead of stdout
    pub file: Option<PathBuf>,
    /// Include file:line in each record
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("SERVANT_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: env::var("SERVANT_LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.format),
            file: None,
            include_location: env::var("SERVANT_LOG_LOCATION")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber.
///
/// When the configured log file cannot be opened, logging falls back to
/// stdout and the failure is reported as the first warning. Keep the returned
/// guard alive for the lifetime of the process; dropping it flushes and stops
/// the writer thread.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<WorkerGuard> {
    let level = parse_level(&config.log_level);
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    if let Ok(directive) = "may_minihttp=warn".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    let mut open_failure = None;
    let writer: Box<dyn Write + Send> = match &config.file {
        Some(path) => match open_log_file(path) {
            Ok(file) => Box::new(file),
            Err(e) => {
                open_failure = Some((path.clone(), e));
                Box::new(io::stdout())
            }
        },
        None => Box::new(io::stdout()),
    };
    let to_file = config.file.is_some() && open_failure.is_none();
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(non_blocking)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(!to_file)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(non_blocking)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    if let Some((path, e)) = open_failure {
        warn!(path = %path.display(), error = %e, "can not open log file, logging to stdout");
    }
    Ok(guard)
}
