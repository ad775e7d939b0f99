// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable / default path access, shared by the
//! `vcycled` binary and the `vcycle` CLI.

use std::path::PathBuf;

/// Where `vcycled`/`vcycle` look for `*.conf` files absent an explicit
/// `--config-dir` or `VCYCLE_CONF_DIR` override.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/vcycle.d";

/// Resolves the config directory: explicit CLI value > `VCYCLE_CONF_DIR` >
/// [`DEFAULT_CONFIG_DIR`].
pub fn config_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var("VCYCLE_CONF_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}
