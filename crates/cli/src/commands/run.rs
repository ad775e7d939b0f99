// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vcycle run` - run every configured space's cycle loop in the
//! foreground until SIGTERM/SIGINT (§4.15). Unlike `daemon start
//! --foreground`, this does not take the PID-file lock: it is meant for
//! interactive/debug use, side by side with a real daemon if one is
//! already managing the same state directory.

use std::path::Path;

use anyhow::{anyhow, Result};
use vcycle_core::Config;
use vcycle_store::StateStore;

pub async fn run(config_dir: &Path) -> Result<()> {
    let config = Config::load_dir(config_dir).map_err(|e| anyhow!("{e}"))?;
    let _log_guard = vcycle_daemon::logging::init(true, &config.settings.log_directory, &config.settings.log_level);
    let store = StateStore::new(config.settings.state_directory.clone());

    vcycle_daemon::run_forever(&config, store, env!("CARGO_PKG_VERSION")).await;
    Ok(())
}
