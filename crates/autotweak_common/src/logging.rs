//! Logging setup
//!
//! One `tracing` subscriber with two sinks:
//! - stderr, warnings only unless verbose
//! - a plain-text file per run under the configured log directory
//!
//! `RUST_LOG` overrides the configured level for the file sink.

use crate::config::LogConfig;
use chrono::Local;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Used when the configured log directory cannot be created
pub fn fallback_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".autotweak")
}

/// `autotweak_<YYYY-MM-DD_HH-MM-SS>.log` inside `dir`
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("autotweak_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S")))
}

fn open_log_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let path = log_file_path(dir);
    let file = File::create(&path)?;
    Ok((path, file))
}

fn file_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber
///
/// Returns the log file in use, if one could be opened. Calling this twice
/// leaves the first subscriber in place.
pub fn init(config: &LogConfig, verbose: bool) -> Option<PathBuf> {
    let opened = open_log_file(&config.dir)
        .or_else(|_| open_log_file(&fallback_log_dir()))
        .ok();

    let (log_path, file_layer) = match opened {
        Some((path, file)) => {
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(file_filter(&config.level));
            (Some(path), Some(layer))
        }
        None => (None, None),
    };

    let stderr_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .with_filter(stderr_level);

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    log_path
}
