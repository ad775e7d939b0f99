// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-level concurrency (SPEC_FULL.md §5 "Process-level concurrency"):
//! each configured space's cycle loop runs as its own `tokio` task spawned
//! from the daemon's main loop. Tasks share nothing but the state-store
//! handle (cheaply cloneable) and the wall clock. A space task that panics
//! is caught at the task boundary, logged, and the task is respawned after a
//! short delay rather than bringing down the process — the daemon's
//! availability must not depend on one backend's API misbehaving.

use std::time::Duration;

use rand::thread_rng;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vcycle_adapters::openstack::{OpenStackAdapter, OpenStackConfig};
use vcycle_core::{Clock, Config, Severity, Space, SystemClock, VcycleError};
use vcycle_engine::{run_cycle, CycleDeps};
use vcycle_store::StateStore;

/// How often each space's cycle runs, absent a per-space override (no such
/// override exists yet; see DESIGN.md).
pub const DEFAULT_CYCLE_SECONDS: i64 = 300;

/// Delay before respawning a space task after it panics.
const RESPAWN_DELAY: Duration = Duration::from_secs(5);

fn build_adapter(space: &Space) -> Result<OpenStackAdapter, VcycleError> {
    let creds = &space.credentials;
    OpenStackAdapter::new(OpenStackConfig {
        identity_url: creds.identity_url.clone(),
        api_version: space.api_version.clone(),
        username: creds.username.clone(),
        password: creds.password.clone(),
        project_name: creds.project_name.clone(),
        domain_name: creds.domain_name.clone(),
        region: creds.region.clone(),
        token_cache_path: None,
    })
    .map_err(|e| VcycleError::fatal(format!("{}: failed to build cloud adapter: {e}", space.name)))
}

/// Runs one space's cycle loop until the process is asked to shut down.
/// Constructs its `CloudAdapter` once so the OpenStack identity token is
/// cached across cycles, then loops: cycle, sleep, repeat. A `Fatal` error
/// (e.g. bad credentials) ends the loop; `Transient`/`Policy` errors are
/// logged and the loop continues on the next tick.
async fn run_space_forever(mut space: Space, store: StateStore, local_hostname: String, daemon_version: String) {
    let adapter = match build_adapter(&space) {
        Ok(adapter) => adapter,
        Err(err) => {
            error!(space = %space.name, %err, "giving up on space: could not build cloud adapter");
            return;
        }
    };
    let site = space.gocdb_sitename.clone().unwrap_or_else(|| space.name.clone());
    let mut rng = thread_rng();

    loop {
        let now = SystemClock.epoch_seconds();
        let deps = CycleDeps {
            adapter: &adapter,
            store: &store,
            local_hostname: &local_hostname,
            daemon_version: &daemon_version,
            cycle_seconds: DEFAULT_CYCLE_SECONDS,
            site: &site,
        };
        match run_cycle(&deps, &mut space, now, &mut rng).await {
            Ok(report) => {
                if report.created > 0 || report.deleted > 0 || !report.errors.is_empty() {
                    info!(space = %space.name, created = report.created, deleted = report.deleted, errors = report.errors.len(), "cycle complete");
                }
                for error in &report.errors {
                    warn!(space = %space.name, %error, "cycle reported a non-fatal error");
                }
            }
            Err(err) if err.severity() == Severity::Fatal => {
                error!(space = %space.name, %err, "fatal error, stopping this space's cycle loop");
                return;
            }
            Err(err) => {
                warn!(space = %space.name, %err, "cycle failed, retrying next tick");
            }
        }
        tokio::time::sleep(Duration::from_secs(DEFAULT_CYCLE_SECONDS as u64)).await;
    }
}

/// Wraps [`run_space_forever`] in a supervised, panic-catching, respawning
/// task, per §5's process-level concurrency model.
async fn supervise_space(space: Space, store: StateStore, local_hostname: String, daemon_version: String) {
    loop {
        let task_space = space.clone();
        let task_store = store.clone();
        let task_hostname = local_hostname.clone();
        let task_version = daemon_version.clone();

        let handle: JoinHandle<()> = tokio::spawn(run_space_forever(task_space, task_store, task_hostname, task_version));
        match handle.await {
            Ok(()) => {
                error!(space = %space.name, "space cycle loop exited (fatal error); respawning after a delay");
            }
            Err(join_err) => {
                error!(space = %space.name, panic = %join_err, "space cycle task panicked; respawning after a delay");
            }
        }
        tokio::time::sleep(RESPAWN_DELAY).await;
    }
}

/// Waits for SIGTERM or SIGINT (Ctrl-C), matching `run`'s "foreground, runs
/// until SIGTERM/SIGINT" contract (§4.15).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Spawns one supervised task per configured space and blocks until a
/// shutdown signal arrives, then aborts every space task and returns.
pub async fn run_forever(config: &Config, store: StateStore, daemon_version: &str) {
    let mut handles = Vec::with_capacity(config.spaces.len());
    for space in config.spaces.values() {
        let handle = tokio::spawn(supervise_space(
            space.clone(),
            store.clone(),
            config.settings.hostname.clone(),
            daemon_version.to_string(),
        ));
        handles.push(handle);
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping all space cycle tasks");
    for handle in handles {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcycle_core::SpaceCredentials;

    fn sample_space() -> Space {
        Space {
            name: "example.space".into(),
            api: "openstack".into(),
            api_version: "3".into(),
            credentials: SpaceCredentials {
                project_name: "tenant".into(),
                domain_name: None,
                username: "u".into(),
                password: "p".into(),
                identity_url: "https://cloud.example/identity".into(),
                network_uuid: None,
                region: None,
                security_groups: vec![],
            },
            processors_limit: Some(100),
            flavor_names: vec![],
            volume_gb_per_processor: 0,
            shutdown_time: None,
            gocdb_sitename: None,
            vacmon_endpoints: vec![],
            https_host: None,
            https_port: Space::default_https_port(),
            cleanup_hours: Space::default_cleanup_hours(),
            machinetypes: Default::default(),
            total_machines: 0,
            total_processors: 0,
            total_hs06: 0.0,
        }
    }

    #[test]
    fn build_adapter_accepts_a_well_formed_space() {
        let space = sample_space();
        assert!(build_adapter(&space).is_ok());
    }
}
