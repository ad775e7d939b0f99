// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locating the `vcycled` sibling binary that `daemon start` spawns in the
//! background.

use std::path::PathBuf;

/// Finds the `vcycled` binary: first beside the currently running `vcycle`
/// executable (the common case for an installed or locally built pair of
/// binaries), falling back to a bare `PATH` lookup.
pub fn find_vcycled_binary() -> PathBuf {
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let sibling = dir.join("vcycled");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("vcycled")
}
