// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vcycled`: the background process a `vcycle daemon start` spawns (or that
//! `vcycle run` execs directly in the foreground). Not meant to be invoked
//! by operators directly; see the `vcycle` CLI for the supported interface.

use std::path::PathBuf;

use vcycle_core::Config;
use vcycle_daemon::{logging, PidFile};
use vcycle_store::StateStore;

struct Args {
    config_dir: Option<PathBuf>,
    foreground: bool,
}

fn parse_args() -> Args {
    let mut config_dir = None;
    let mut foreground = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--foreground" => foreground = true,
            "--config-dir" => config_dir = args.next().map(PathBuf::from),
            _ => {}
        }
    }

    Args { config_dir, foreground }
}

#[tokio::main]
async fn main() {
    let args = parse_args();
    let config_dir = vcycle_daemon::config_dir(args.config_dir);

    let config = match Config::load_dir(&config_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("vcycled: failed to load configuration from {}: {err}", config_dir.display());
            std::process::exit(1);
        }
    };

    let _log_guard = logging::init(args.foreground, &config.settings.log_directory, &config.settings.log_level);

    let pid_file = PidFile::new(&config.settings.state_directory);
    let _lock = match pid_file.acquire() {
        Ok(lock) => lock,
        Err(err) => {
            tracing::error!(%err, "failed to start: could not acquire daemon lock");
            std::process::exit(1);
        }
    };

    let store = StateStore::new(config.settings.state_directory.clone());
    tracing::info!(spaces = config.spaces.len(), "vcycled starting");

    vcycle_daemon::run_forever(&config, store, env!("CARGO_PKG_VERSION")).await;

    tracing::info!("vcycled exiting");
}
