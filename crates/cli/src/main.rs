// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vcycle`: process entry point (SPEC_FULL.md §4.15). A single binary
//! with `run` (foreground cycle loop), `daemon start|stop|restart|status`
//! (PID-file-based background lifecycle management), and `--show-conf`
//! (load, validate, and print the materialised configuration, then exit).

mod commands;
mod process;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use commands::daemon::DaemonCommand;

#[derive(Parser)]
#[command(name = "vcycle", version, about = "Virtual-machine factory and lifecycle manager")]
struct Cli {
    /// Directory containing *.conf files (default: $VCYCLE_CONF_DIR, else /etc/vcycle.d)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Load and validate configuration, print it back out, then exit
    #[arg(long)]
    show_conf: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every configured space's cycle loop in the foreground
    Run,
    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn show_conf(config_dir: &Path) -> anyhow::Result<()> {
    let config = vcycle_core::Config::load_dir(config_dir).map_err(|e| anyhow::anyhow!("{e}"))?;
    print!("{}", config.render());
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_dir = vcycle_daemon::config_dir(cli.config_dir.clone());

    let result = if cli.show_conf {
        show_conf(&config_dir)
    } else {
        match cli.command {
            Some(Command::Run) => commands::run::run(&config_dir).await,
            Some(Command::Daemon { command }) => commands::daemon::dispatch(command, &config_dir).await,
            None => {
                eprintln!("no subcommand given; try `vcycle run`, `vcycle daemon status`, or `vcycle --show-conf`");
                std::process::exit(2);
            }
        }
    };

    if let Err(err) = result {
        eprintln!("vcycle: {err}");
        std::process::exit(1);
    }
}
