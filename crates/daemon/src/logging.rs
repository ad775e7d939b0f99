// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured logging init (SPEC_FULL.md §4.16): an env-filter
//! controlled subscriber writing human-readable lines to stdout in the
//! foreground, and additionally to a daily-rotating file under
//! `log_directory` when daemonised. An `RUST_LOG` environment override
//! takes precedence over the configured level, matching the filter-then-config
//! precedence used elsewhere in the ambient stack (e.g. config deprecation
//! warnings).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialises the global tracing subscriber. Returns the file appender's
/// [`WorkerGuard`] when daemonised — the caller must keep it alive for the
/// lifetime of the process, or buffered log lines are dropped on exit.
pub fn init(foreground: bool, log_directory: &Path, log_level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let stdout_layer = fmt::layer().with_target(false);

    if foreground {
        tracing_subscriber::registry().with(filter).with(stdout_layer).init();
        return None;
    }

    if let Err(err) = std::fs::create_dir_all(log_directory) {
        eprintln!("warning: could not create log directory {}: {err}", log_directory.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_directory, "vcycled.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().with_target(false).with_ansi(false).with_writer(non_blocking);

    tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).init();
    Some(guard)
}
