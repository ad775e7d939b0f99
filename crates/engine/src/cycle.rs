// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The space cycle driver (SPEC_FULL.md §4.9): one pass of
//! connect -> scan -> VacMon -> delete -> archive -> heartbeat -> create ->
//! cleanup -> takeover for a single space, run on a fixed interval by the
//! daemon's per-space task (§5).

use std::collections::HashSet;

use rand::Rng;
use vcycle_adapters::CloudAdapter;
use vcycle_core::{Machine, MachineName, MachineState, Space, VcycleError};
use vcycle_store::{StateStore, StoreError};

use crate::{abort, accounting, allocator, classifier, deletion, factory, heartbeat, takeover};

fn store_err(e: StoreError) -> VcycleError {
    VcycleError::transient(e.to_string())
}

fn load_machine(store: &StateStore, space: &str, name: &str) -> Option<Machine> {
    store.get(space, name, "state.json").and_then(|raw| serde_json::from_str(&raw).ok())
}

fn persist_machine(store: &StateStore, machine: &Machine) -> Result<(), VcycleError> {
    let raw = serde_json::to_vec(machine)
        .map_err(|e| VcycleError::fatal(format!("failed to serialise {}: {e}", machine.name)))?;
    store.put(&machine.space_name, machine.name.as_str(), "state.json", &raw, 0o640).map_err(store_err)
}

fn read_public_key(path: Option<&str>) -> String {
    let Some(path) = path else { return String::new() };
    std::fs::read_to_string(path).unwrap_or_else(|err| {
        tracing::warn!(%path, %err, "failed to read root public key, using empty key");
        String::new()
    })
}

/// Everything the cycle needs that isn't the space itself.
pub struct CycleDeps<'a> {
    pub adapter: &'a dyn CloudAdapter,
    pub store: &'a StateStore,
    pub local_hostname: &'a str,
    pub daemon_version: &'a str,
    pub cycle_seconds: i64,
    pub site: &'a str,
}

/// What happened during one cycle, for logging and the daemon's own status
/// reporting; never fatal in itself.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub created: u32,
    pub deleted: u32,
    pub errors: Vec<String>,
}

/// Runs one cycle for `space`, mutating its per-cycle totals and its
/// machinetypes' counters in place. Only a `connect` or scan failure aborts
/// the cycle early (Transient, §4.9); every later step is best-effort and
/// reports its failures through [`CycleReport::errors`] instead.
pub async fn run_cycle(deps: &CycleDeps<'_>, space: &mut Space, now: i64, rng: &mut impl Rng) -> Result<CycleReport, VcycleError> {
    let mut report = CycleReport::default();

    deps.adapter.connect().await.map_err(|e| VcycleError::transient(e.to_string()))?;

    let servers = deps.adapter.list_servers().await.map_err(|e| VcycleError::transient(e.to_string()))?;
    let flavors = deps.adapter.list_flavors().await.map_err(|e| VcycleError::transient(e.to_string()))?;
    if let Some(limit) = deps.adapter.processors_limit().await.map_err(|e| VcycleError::transient(e.to_string()))? {
        space.processors_limit = Some(limit);
    }

    let last_abort_times = deps.store.last_abort_times();
    for mt in space.machinetypes.values_mut() {
        let was_fizzle = last_abort_times.is_last_abort_fizzle(&space.name, &mt.name);
        mt.counters = Default::default();
        mt.counters.not_passed_fizzle = u32::from(was_fizzle);
    }
    space.total_machines = 0;
    space.total_processors = 0;
    space.total_hs06 = 0.0;

    let mut seen_names: HashSet<String> = HashSet::new();
    let mut live_machines: Vec<Machine> = Vec::new();

    for record in &servers {
        seen_names.insert(record.name.clone());
        let flavor_processors = flavors.get(&record.flavor_id).map(|f| f.processors).unwrap_or(0);

        if !MachineName::is_managed_prefix(&record.name) {
            // Unmanaged VM: counts toward the space total, nothing else.
            space.total_processors += flavor_processors;
            continue;
        }

        let previous = load_machine(deps.store, &space.name, &record.name);
        let outcome = classifier::classify(previous.as_ref(), record, flavor_processors, now);
        let machinetype_name =
            record.machinetype.clone().or_else(|| previous.as_ref().map(|m| m.machinetype_name.clone())).unwrap_or_default();
        let first_terminal = previous.as_ref().and_then(|m| m.stopped_time).is_none() && outcome.stopped_time.is_some();

        let mut machine = previous.unwrap_or_else(|| Machine {
            name: MachineName::from_string(record.name.clone()),
            space_name: space.name.clone(),
            machinetype_name: machinetype_name.clone(),
            state: outcome.state,
            ip: outcome.ip.clone(),
            uuid: Some(record.uuid.clone()),
            created_time: outcome.created_time,
            started_time: outcome.started_time,
            updated_time: outcome.updated_time,
            stopped_time: outcome.stopped_time,
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: record.availability_zone.clone(),
            processors: outcome.processors,
            hs06: None,
            // No prior record and the cloud carries no ownership tag: leave
            // unclaimed so any live manager can take it over (§4.8).
            manager: String::new(),
            manager_heartbeat_time: 0,
            shutdown_time_job: None,
        });

        machine.state = outcome.state;
        machine.ip = outcome.ip.clone();
        machine.updated_time = outcome.updated_time;
        machine.processors = outcome.processors;
        machine.uuid = Some(record.uuid.clone());
        if let Some(started) = outcome.started_time {
            machine.started_time = Some(started);
        }
        if let Some(stopped) = outcome.stopped_time {
            machine.stopped_time = Some(stopped);
        }

        if let Some(mt) = space.machinetypes.get(&machine.machinetype_name) {
            machine.hs06 = mt.hs06_per_processor.map(|per| per * f64::from(machine.processors));
            if first_terminal {
                if let Err(err) = abort::record_abort_if_applicable(&last_abort_times, &space.name, &mt.name, &machine, mt.fizzle_seconds) {
                    report.errors.push(format!("{}: failed to record abort: {err}", machine.name));
                }
                match accounting::record_terminal_transition(deps.store, &machine, mt, deps.site, deps.local_hostname) {
                    Ok(_) => {}
                    Err(err) => report.errors.push(format!("{}: failed to record accounting: {err}", machine.name)),
                }
            }
        }

        if let Err(err) = persist_machine(deps.store, &machine) {
            report.errors.push(format!("{}: failed to persist: {err}", machine.name));
        }

        space.total_processors += machine.processors;
        space.total_machines += 1;
        if let Some(mt) = space.machinetypes.get_mut(&machine.machinetype_name) {
            mt.counters.total_machines += 1;
            mt.counters.total_processors += machine.processors;
            match machine.state {
                MachineState::Starting => mt.counters.starting_processors += machine.processors,
                MachineState::Running => {
                    mt.counters.running_machines += 1;
                    mt.counters.running_processors += machine.processors;
                    if let Some(hs06) = machine.hs06 {
                        mt.counters.running_hs06 = Some(mt.counters.running_hs06.unwrap_or(0.0) + hs06);
                        space.total_hs06 += hs06;
                    }
                }
                _ => {}
            }
            if matches!(machine.state, MachineState::Starting | MachineState::Running) {
                mt.counters.weighted_machines += mt.weight_contribution(machine.hs06, machine.processors);
            }
        }

        live_machines.push(machine);
    }

    let payloads = accounting::build_payloads(deps.daemon_version, deps.cycle_seconds, deps.local_hostname, space, &live_machines);
    accounting::send_vacmon(&space.vacmon_endpoints, &payloads).await;

    for machine in live_machines.iter_mut() {
        if !machine.managed_here(deps.local_hostname) {
            continue;
        }
        let Some(mt) = space.machinetypes.get(&machine.machinetype_name) else { continue };
        let Some(decision) = deletion::decide(machine, mt, space.shutdown_time, now) else { continue };

        if let Some(reason) = &decision.reason {
            machine.shutdown_message = Some(reason.clone());
            machine.shutdown_message_time = Some(now);
        }
        if let Some(uuid) = machine.uuid.clone() {
            if let Err(err) = deps.adapter.delete_server(&uuid).await {
                report.errors.push(format!("{}: delete_server failed: {err}", machine.name));
                continue;
            }
        }
        machine.deleted_time = Some(now);
        report.deleted += 1;
        if let Err(err) = persist_machine(deps.store, machine) {
            report.errors.push(format!("{}: failed to persist after delete: {err}", machine.name));
        }
    }

    if let Ok(persisted) = deps.store.list_machines(&space.name) {
        for name in persisted {
            if !seen_names.contains(&name) {
                if let Err(err) = deps.store.move_to_deleted(&space.name, &name) {
                    report.errors.push(format!("{name}: failed to archive vanished machine: {err}"));
                }
            }
        }
    }

    for (mt_name, mt) in &space.machinetypes {
        let Some(heartbeat_file) = &mt.heartbeat_file else { continue };
        let heartbeat_seconds = mt.heartbeat_seconds.unwrap_or(3600);
        for machine in live_machines.iter_mut().filter(|m| m.machinetype_name == *mt_name && m.state == MachineState::Running) {
            if heartbeat::poll_one(deps.store, &space.name, machine, heartbeat_file) {
                if let Err(err) = persist_machine(deps.store, machine) {
                    report.errors.push(format!("{}: failed to persist heartbeat: {err}", machine.name));
                }
            }
        }
        let type_machines: Vec<Machine> = live_machines.iter().filter(|m| m.machinetype_name == *mt_name).cloned().collect();
        if let Err(err) = heartbeat::rewrite_heartbeat_list(deps.store, &space.name, mt_name, &type_machines, heartbeat_seconds, now) {
            report.errors.push(format!("{mt_name}: failed to rewrite heartbeat list: {err}"));
        }
    }

    let picks = allocator::plan_creations(space, |mt_name| last_abort_times.get(&space.name, mt_name), now, rng);
    for pick in picks {
        let Some(mt) = space.machinetypes.get(&pick.machinetype).cloned() else { continue };
        let public_key = read_public_key(mt.root_public_key_path.as_deref());
        let cvmfs_proxy_addresses: Vec<String> = mt
            .cvmfs_proxy_machinetype
            .as_ref()
            .map(|sibling| deps.store.read_heartbeat_list(&space.name, sibling).into_iter().map(|e| e.ip).collect())
            .unwrap_or_default();

        let inputs = factory::FactoryInputs {
            flavors: &flavors,
            public_key: &public_key,
            cvmfs_proxy_addresses: &cvmfs_proxy_addresses,
            local_hostname: deps.local_hostname,
            now,
        };

        match factory::create_machine(deps.adapter, deps.store, space, &mt, &inputs).await {
            Ok(machine) => {
                if let Err(err) = persist_machine(deps.store, &machine) {
                    report.errors.push(format!("{}: failed to persist new machine: {err}", machine.name));
                }
                report.created += 1;
                live_machines.push(machine);
            }
            Err(err) => report.errors.push(format!("{}: create_machine failed: {err}", pick.machinetype)),
        }
    }

    if let Err(err) = deps.store.purge_deleted(&space.name, space.cleanup_hours, now) {
        report.errors.push(format!("failed to purge deleted directories: {err}"));
    }

    for machine in live_machines.iter_mut() {
        if machine.managed_here(deps.local_hostname) {
            continue;
        }
        let jitter = takeover::draw_jitter(rng);
        if !takeover::is_abandoned(machine, deps.local_hostname, now, jitter) {
            continue;
        }
        takeover::take_over(machine, deps.local_hostname, now);
        if let Err(err) = persist_machine(deps.store, machine) {
            report.errors.push(format!("{}: failed to persist takeover: {err}", machine.name));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use vcycle_adapters::{FakeCloudAdapter, Flavor};
    use vcycle_core::{ImageRef, Machinetype, MachinetypeCounters, SpaceCredentials, VacmonEndpoint};

    fn machinetype() -> Machinetype {
        Machinetype {
            name: "mt1".into(),
            space_name: "s".into(),
            flavor_names: vec!["m1.small".into()],
            min_processors: 2,
            max_processors: None,
            processors_limit: 100,
            max_starting_processors: 100,
            max_starting_seconds: 3600,
            backoff_seconds: 300,
            fizzle_seconds: 600,
            max_wallclock_seconds: 86_400,
            target_share: 1.0,
            rss_bytes_per_processor: Machinetype::default_rss_bytes_per_processor(),
            hs06_per_processor: None,
            root_image: ImageRef::Named("cc7".into()),
            root_public_key_path: None,
            heartbeat_file: None,
            heartbeat_seconds: None,
            cvmfs_proxy_machinetype: None,
            accounting_fqan: None,
            user_data_template_path: None,
            user_data_options: Default::default(),
            image_signing_dn: None,
            counters: MachinetypeCounters::default(),
        }
    }

    fn space() -> Space {
        Space {
            name: "s".into(),
            api: "openstack".into(),
            api_version: "3".into(),
            credentials: SpaceCredentials {
                project_name: "t".into(),
                domain_name: None,
                username: "u".into(),
                password: "p".into(),
                identity_url: "https://example".into(),
                network_uuid: None,
                region: None,
                security_groups: vec![],
            },
            processors_limit: Some(100),
            flavor_names: vec![],
            volume_gb_per_processor: 0,
            shutdown_time: None,
            gocdb_sitename: None,
            vacmon_endpoints: Vec::<VacmonEndpoint>::new(),
            https_host: None,
            https_port: 443,
            cleanup_hours: 72,
            machinetypes: Default::default(),
            total_machines: 0,
            total_processors: 0,
            total_hs06: 0.0,
        }
    }

    #[tokio::test]
    async fn empty_cloud_creates_a_machine_up_to_budget() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let adapter = FakeCloudAdapter::new()
            .with_flavor("m1.small", Flavor { id: "flavor-1".into(), mb: 4096, processors: 2 })
            .with_processors_limit(Some(2));
        let mut s = space();
        s.machinetypes.insert("mt1".into(), machinetype());

        let deps = CycleDeps { adapter: &adapter, store: &store, local_hostname: "host-a", daemon_version: "1.0.0", cycle_seconds: 300, site: "RAL-LCG2" };
        let mut rng = StdRng::seed_from_u64(1);
        let report = run_cycle(&deps, &mut s, 1_000, &mut rng).await.unwrap();

        assert_eq!(report.created, 1);
        assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
        assert_eq!(s.total_processors, 2);
    }

    #[tokio::test]
    async fn abandoned_peer_machine_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let adapter = FakeCloudAdapter::new()
            .with_flavor("m1.small", Flavor { id: "flavor-1".into(), mb: 4096, processors: 2 })
            .with_processors_limit(Some(0)); // no room to create more this cycle
        adapter.seed_server(vcycle_adapters::ServerRecord {
            name: "vcycle-mt1-abcdefghij".into(),
            uuid: "uuid-1".into(),
            flavor_id: "m1.small".into(),
            address: Some("10.0.0.5".into()),
            created: Some("2026-01-01T00:00:00Z".into()),
            updated: Some("2026-01-01T00:05:00Z".into()),
            launched_at: Some("2026-01-01T00:00:30Z".into()),
            task_state: None,
            power_state: Some(1),
            status: "ACTIVE".into(),
            machinetype: Some("mt1".into()),
            availability_zone: None,
        });

        let mut s = space();
        s.processors_limit = Some(0);
        s.machinetypes.insert("mt1".into(), machinetype());

        let deps = CycleDeps { adapter: &adapter, store: &store, local_hostname: "host-b", daemon_version: "1.0.0", cycle_seconds: 300, site: "RAL-LCG2" };
        let mut rng = StdRng::seed_from_u64(1);
        run_cycle(&deps, &mut s, 10_000, &mut rng).await.unwrap();

        let persisted = load_machine(&store, "s", "vcycle-mt1-abcdefghij").unwrap();
        assert_eq!(persisted.manager, "host-b", "unclaimed machine with a long-stale implicit heartbeat should be taken over");
    }

    #[tokio::test]
    async fn unmanaged_vm_counts_toward_space_total_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let adapter = FakeCloudAdapter::new()
            .with_flavor("m1.small", Flavor { id: "flavor-1".into(), mb: 4096, processors: 4 })
            .with_processors_limit(Some(0));
        adapter.seed_server(vcycle_adapters::ServerRecord {
            name: "some-other-vm".into(),
            uuid: "uuid-2".into(),
            flavor_id: "m1.small".into(),
            address: Some("10.0.0.9".into()),
            created: None,
            updated: None,
            launched_at: None,
            task_state: None,
            power_state: Some(1),
            status: "ACTIVE".into(),
            machinetype: None,
            availability_zone: None,
        });

        let mut s = space();
        s.processors_limit = Some(0);

        let deps = CycleDeps { adapter: &adapter, store: &store, local_hostname: "host-a", daemon_version: "1.0.0", cycle_seconds: 300, site: "RAL-LCG2" };
        let mut rng = StdRng::seed_from_u64(1);
        let report = run_cycle(&deps, &mut s, 1_000, &mut rng).await.unwrap();

        assert_eq!(s.total_processors, 4);
        assert_eq!(s.total_machines, 0);
        assert!(report.errors.is_empty());
    }
}
