// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID-file-based daemon lifecycle management (SPEC_FULL.md §4.15):
//! an advisory-locked PID file under the state directory so a second
//! `daemon start` against the same state directory is refused rather than
//! racing, and `daemon stop`/`daemon status` can find and signal the running
//! process without an IPC channel.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire daemon lock at {0}: daemon already running?")]
    LockFailed(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to signal pid {0}: {1}")]
    Signal(i32, nix::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(i32),
    NotRunning,
}

/// A handle onto `<state_directory>/vcycled.pid`.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

/// The held advisory lock on a [`PidFile`]. Dropping this removes the PID
/// file so `status`/`stop` observe "not running" immediately rather than
/// waiting on `kill(pid, 0)` to fail only once the pid is recycled.
pub struct PidLock {
    path: PathBuf,
    _file: File,
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl PidFile {
    pub fn new(state_directory: &Path) -> Self {
        Self { path: state_directory.join("vcycled.pid") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires the exclusive lock and writes the current process's PID.
    /// Uses `OpenOptions` rather than truncating up front so a failed lock
    /// attempt never wipes the running daemon's PID.
    pub fn acquire(&self) -> Result<PidLock, LifecycleError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(&self.path)?;
        file.try_lock_exclusive().map_err(|_| LifecycleError::LockFailed(self.path.clone()))?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(PidLock { path: self.path.clone(), _file: file })
    }

    pub fn read_pid(&self) -> Option<i32> {
        std::fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }

    fn process_alive(pid: i32) -> bool {
        signal::kill(Pid::from_raw(pid), None).is_ok()
    }

    /// Reports whether a daemon is currently running against this PID file,
    /// resolving stale files (process gone without a clean shutdown) to
    /// `NotRunning`.
    pub fn status(&self) -> DaemonStatus {
        match self.read_pid() {
            Some(pid) if Self::process_alive(pid) => DaemonStatus::Running(pid),
            _ => DaemonStatus::NotRunning,
        }
    }

    /// Signals the running daemon, if any. Returns `false` (not an error)
    /// when no daemon is running, matching `daemon stop`'s idempotent exit
    /// code (§4.15).
    pub fn signal(&self, signal: Signal) -> Result<bool, LifecycleError> {
        let pid = match self.status() {
            DaemonStatus::Running(pid) => pid,
            DaemonStatus::NotRunning => return Ok(false),
        };
        signal::kill(Pid::from_raw(pid), signal).map_err(|e| LifecycleError::Signal(pid, e))?;
        Ok(true)
    }
}
