// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The accounting/telemetry emitter (SPEC_FULL.md §4.10): APEL
//! individual-job-usage records on terminal transitions, plus once-per-cycle
//! VacMon UDP JSON datagrams.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vcycle_core::{Machine, Machinetype, Space, VacmonEndpoint};
use vcycle_store::{ApelRecord, StateStore, StoreError};

/// Builds the APEL record for a machine's terminal transition, or `None` if
/// the machine is not (yet) in a terminal state. Call only once per machine,
/// on the cycle where the classifier first reports a terminal state.
pub fn terminal_apel_record(machine: &Machine, machinetype: &Machinetype, site: &str, submit_host: &str) -> Option<ApelRecord> {
    if !machine.state.is_terminal() {
        return None;
    }
    let started = machine.started_time.unwrap_or(machine.created_time);
    let stopped = machine.stopped_time.unwrap_or(started);
    Some(ApelRecord {
        site: site.to_string(),
        submit_host: submit_host.to_string(),
        local_job_id: machine.name.as_str().to_string(),
        local_user_id: "vcycle".to_string(),
        queue: machinetype.accounting_fqan.clone().unwrap_or_else(|| "grid".to_string()),
        processor_count: machine.processors,
        wall_duration: stopped - started,
        start_time: started,
        end_time: stopped,
        service_level: machinetype.hs06_per_processor.unwrap_or(1.0),
    })
}

/// `YYYYMMDD` for the record's archive/outgoing directory.
pub fn day_string(epoch_seconds: i64) -> String {
    match DateTime::<Utc>::from_timestamp(epoch_seconds, 0) {
        Some(dt) => dt.format("%Y%m%d").to_string(),
        None => "19700101".to_string(),
    }
}

/// Builds and persists the APEL record for one terminal machine. Returns
/// `false` without writing anything if the machine is not terminal.
pub fn record_terminal_transition(
    store: &StateStore,
    machine: &Machine,
    machinetype: &Machinetype,
    site: &str,
    submit_host: &str,
) -> Result<bool, StoreError> {
    let Some(record) = terminal_apel_record(machine, machinetype, site, submit_host) else { return Ok(false) };
    let day = day_string(record.end_time);
    store.write_apel_record(&day, machine.name.as_str(), &record)?;
    Ok(true)
}

#[derive(Debug, Clone, Serialize)]
struct FactoryStatus<'a> {
    message_type: &'static str,
    daemon_version: &'a str,
    cycle_seconds: i64,
    hostname: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct MachinetypeStatus<'a> {
    message_type: &'static str,
    space_name: &'a str,
    machinetype_name: &'a str,
    target_share: f64,
    running_processors: u32,
    running_hs06: Option<f64>,
    requested_processors: u32,
}

#[derive(Debug, Clone, Serialize)]
struct MachineStatus<'a> {
    message_type: &'static str,
    name: &'a str,
    state: String,
    processors: u32,
    hs06: Option<f64>,
    ip: &'a str,
}

/// Serialises the three VacMon message families for one space's cycle
/// (§4.10, §6). Each element is one UDP datagram's payload.
pub fn build_payloads(daemon_version: &str, cycle_seconds: i64, hostname: &str, space: &Space, machines: &[Machine]) -> Vec<Vec<u8>> {
    let mut payloads = Vec::with_capacity(1 + space.machinetypes.len() + machines.len());

    payloads.push(serde_json::to_vec(&FactoryStatus { message_type: "factory_status", daemon_version, cycle_seconds, hostname }).unwrap_or_default());

    for (name, mt) in &space.machinetypes {
        payloads.push(
            serde_json::to_vec(&MachinetypeStatus {
                message_type: "machinetype_status",
                space_name: &space.name,
                machinetype_name: name,
                target_share: mt.target_share,
                running_processors: mt.counters.running_processors,
                running_hs06: mt.counters.running_hs06,
                requested_processors: mt.counters.starting_processors + mt.counters.running_processors,
            })
            .unwrap_or_default(),
        );
    }

    for machine in machines {
        payloads.push(
            serde_json::to_vec(&MachineStatus {
                message_type: "machine_status",
                name: machine.name.as_str(),
                state: machine.state.to_string(),
                processors: machine.processors,
                hs06: machine.hs06,
                ip: &machine.ip,
            })
            .unwrap_or_default(),
        );
    }

    payloads
}

/// Sends every payload to every configured endpoint. A send failure is
/// logged and does not abort the cycle (Transient, §4.10).
pub async fn send_vacmon(endpoints: &[VacmonEndpoint], payloads: &[Vec<u8>]) {
    if endpoints.is_empty() || payloads.is_empty() {
        return;
    }
    let socket = match tokio::net::UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::warn!(%err, "vacmon: failed to bind local UDP socket");
            return;
        }
    };
    for endpoint in endpoints {
        let addr = format!("{}:{}", endpoint.host, endpoint.port);
        for payload in payloads {
            if let Err(err) = socket.send_to(payload, &addr).await {
                tracing::warn!(host = %endpoint.host, port = endpoint.port, %err, "vacmon send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcycle_core::{ImageRef, MachineName, MachineState, MachinetypeCounters, SpaceCredentials};

    fn machine(state: MachineState) -> Machine {
        Machine {
            name: MachineName::from_string("vcycle-mt1-abcdefghij"),
            space_name: "s".into(),
            machinetype_name: "mt1".into(),
            state,
            ip: "10.0.0.1".into(),
            uuid: Some("uuid-1".into()),
            created_time: 0,
            started_time: Some(100),
            updated_time: 400,
            stopped_time: Some(400),
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: None,
            processors: 4,
            hs06: Some(40.0),
            manager: "host-a".into(),
            manager_heartbeat_time: 400,
            shutdown_time_job: None,
        }
    }

    fn machinetype() -> Machinetype {
        Machinetype {
            name: "mt1".into(),
            space_name: "s".into(),
            flavor_names: vec!["m1.small".into()],
            min_processors: 1,
            max_processors: None,
            processors_limit: 100,
            max_starting_processors: 10,
            max_starting_seconds: 3600,
            backoff_seconds: 300,
            fizzle_seconds: 600,
            max_wallclock_seconds: 86_400,
            target_share: 1.0,
            rss_bytes_per_processor: Machinetype::default_rss_bytes_per_processor(),
            hs06_per_processor: Some(10.0),
            root_image: ImageRef::Named("cc7".into()),
            root_public_key_path: None,
            heartbeat_file: None,
            heartbeat_seconds: None,
            cvmfs_proxy_machinetype: None,
            accounting_fqan: Some("/vo/Role=production".into()),
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
            vacmon_endpoints: vec![],
            https_host: None,
            https_port: 443,
            cleanup_hours: 72,
            machinetypes: Default::default(),
            total_machines: 0,
            total_processors: 0,
            total_hs06: 0.0,
        }
    }

    #[test]
    fn non_terminal_machine_produces_no_record() {
        assert!(terminal_apel_record(&machine(MachineState::Running), &machinetype(), "RAL-LCG2", "vcycle").is_none());
    }

    #[test]
    fn terminal_machine_produces_expected_record() {
        let record = terminal_apel_record(&machine(MachineState::Shutdown), &machinetype(), "RAL-LCG2", "vcycle").unwrap();
        assert_eq!(record.wall_duration, 300);
        assert_eq!(record.processor_count, 4);
        assert_eq!(record.queue, "/vo/Role=production");
        assert_eq!(record.service_level, 10.0);
    }

    #[test]
    fn day_string_formats_utc_date() {
        assert_eq!(day_string(1_769_472_000), "20260127");
    }

    #[test]
    fn record_terminal_transition_writes_apel_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let wrote = record_terminal_transition(&store, &machine(MachineState::Failed), &machinetype(), "RAL-LCG2", "vcycle").unwrap();
        assert!(wrote);
    }

    #[test]
    fn build_payloads_includes_one_per_machinetype_and_machine() {
        let mut s = space();
        s.machinetypes.insert("mt1".into(), machinetype());
        let machines = vec![machine(MachineState::Running)];
        let payloads = build_payloads("1.0.0", 300, "host-a", &s, &machines);
        // 1 factory_status + 1 machinetype_status + 1 machine_status
        assert_eq!(payloads.len(), 3);
    }
}
