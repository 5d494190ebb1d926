//! Tracing configuration and log routing.
//!
//! Pipeline events go to stdout through a compact formatter and to a file. Setting
//! `SMARTLENS_LOG_FILE` appends to that path; otherwise the file is `logs/smartlens.log`.
//! The file writer is non-blocking so upload handlers never wait on disk I/O.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "SMARTLENS_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_NAME: &str = "smartlens.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the stdout and file tracing layers.
///
/// `RUST_LOG` controls filtering and defaults to `info`. The writer guard is parked in a
/// static so buffered lines are flushed for the whole process lifetime.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = open_log_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    // `Option<Layer>` is itself a layer, so a missing file simply disables file output.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

fn log_file_path() -> PathBuf {
    std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR).join(DEFAULT_LOG_NAME))
}

/// Open the log file, or `None` when it cannot be created.
fn open_log_writer() -> Option<NonBlocking> {
    let path = log_file_path();
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
