// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vcycle daemon` - PID-file-based daemon lifecycle management (§4.15).

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use nix::sys::signal::Signal;
use vcycle_core::Config;
use vcycle_daemon::{DaemonStatus, PidFile};

use crate::process::find_vcycled_binary;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon (foreground or background)
    Start {
        /// Run in foreground (useful for debugging)
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the daemon
    Stop {
        /// Send SIGKILL instead of a graceful SIGTERM
        #[arg(long)]
        kill: bool,
    },
    /// Stop and restart the daemon
    Restart {
        /// Send SIGKILL instead of a graceful SIGTERM when stopping
        #[arg(long)]
        kill: bool,
    },
    /// Check daemon status
    Status,
}

pub async fn dispatch(command: DaemonCommand, config_dir: &Path) -> Result<()> {
    match command {
        DaemonCommand::Start { foreground } => start(config_dir, foreground).await,
        DaemonCommand::Stop { kill } => stop(config_dir, kill),
        DaemonCommand::Restart { kill } => restart(config_dir, kill),
        DaemonCommand::Status => status(config_dir),
    }
}

fn load_config(config_dir: &Path) -> Result<Config> {
    Config::load_dir(config_dir).map_err(|e| anyhow!("{e}"))
}

async fn start(config_dir: &Path, foreground: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let pid_file = PidFile::new(&config.settings.state_directory);

    if let DaemonStatus::Running(pid) = pid_file.status() {
        println!("Daemon already running (pid {pid})");
        return Ok(());
    }

    if foreground {
        let _lock = pid_file.acquire().map_err(|e| anyhow!("{e}"))?;
        let _log_guard = vcycle_daemon::logging::init(true, &config.settings.log_directory, &config.settings.log_level);
        let store = vcycle_store::StateStore::new(config.settings.state_directory.clone());
        vcycle_daemon::run_forever(&config, store, env!("CARGO_PKG_VERSION")).await;
        return Ok(());
    }

    spawn_background(config_dir)?;
    wait_for_startup(&pid_file)?;
    println!("Daemon started");
    Ok(())
}

fn spawn_background(config_dir: &Path) -> Result<()> {
    let vcycled = find_vcycled_binary();
    Command::new(&vcycled)
        .arg("--config-dir")
        .arg(config_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("failed to spawn {}: {e}", vcycled.display()))?;
    Ok(())
}

/// Polls the PID file for a short window to confirm the freshly spawned
/// process actually took the lock, rather than reporting success the
/// instant `spawn()` returns.
fn wait_for_startup(pid_file: &PidFile) -> Result<()> {
    for _ in 0..20 {
        if matches!(pid_file.status(), DaemonStatus::Running(_)) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Err(anyhow!("daemon did not report as running within the startup window"))
}

fn stop(config_dir: &Path, kill: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let pid_file = PidFile::new(&config.settings.state_directory);
    let signal = if kill { Signal::SIGKILL } else { Signal::SIGTERM };

    if pid_file.signal(signal).map_err(|e| anyhow!("{e}"))? {
        println!("Daemon stopped");
    } else {
        println!("Daemon not running");
    }
    Ok(())
}

fn restart(config_dir: &Path, kill: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let pid_file = PidFile::new(&config.settings.state_directory);
    let signal = if kill { Signal::SIGKILL } else { Signal::SIGTERM };
    let was_running = pid_file.signal(signal).map_err(|e| anyhow!("{e}"))?;

    if was_running {
        // Grace period for the OS to release the PID file's advisory lock
        // after the old process exits, not a synchronization hack.
        std::thread::sleep(Duration::from_millis(300));
    }

    spawn_background(config_dir)?;
    wait_for_startup(&pid_file)?;
    println!("Daemon restarted");
    Ok(())
}

fn status(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    let pid_file = PidFile::new(&config.settings.state_directory);
    match pid_file.status() {
        DaemonStatus::Running(pid) => println!("Status: running (pid {pid})"),
        DaemonStatus::NotRunning => println!("Status: not running"),
    }
    Ok(())
}
