//! Tracing setup for the scribe binary
//!
//! Logs go to <data dir>/logs/scribe.log unless `--tracing` asks for stderr.

use config::PathManager;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,scribe_core=debug,llm=info";

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered lines are flushed.
pub fn init(trace_to_stderr: bool) -> Option<WorkerGuard> {
    if trace_to_stderr {
        init_stderr(EnvFilter::new("trace"));
        return None;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let Some(path) = PathManager::log_file_path() else {
        init_stderr(filter);
        return None;
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("[scribe] Failed to create log directory {:?}: {}", parent, e);
        }
    }

    let file = match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("[scribe] Failed to open log file {:?}: {}", path, e);
            init_stderr(filter);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true),
    );

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => tracing::info!("Logging initialized, writing to {:?}", path),
        Err(e) => eprintln!("[scribe] Failed to set tracing subscriber: {}", e),
    }
    Some(guard)
}

fn init_stderr(filter: EnvFilter) {
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true));

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[scribe] Failed to set tracing subscriber: {}", e);
    }
}
