// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The deletion policy (SPEC_FULL.md §4.5): chooses which
//! `managedHere` machines to destroy this cycle and why.

use vcycle_core::{Machine, MachineState, Machinetype};

const DELETE_RETRY_FLOOR_SECONDS: i64 = 3600;

/// Why a machine is being deleted this cycle. `None` means "leave it alone".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionDecision {
    pub reason: Option<String>,
}

/// Decides whether `machine` should be deleted this cycle, and why.
/// Assumes the caller has already filtered to `managedHere` machines and
/// applied the retry floor is checked here directly from `deleted_time`.
pub fn decide(machine: &Machine, machinetype: &Machinetype, space_shutdown_time: Option<i64>, now: i64) -> Option<DeletionDecision> {
    if let Some(deleted_time) = machine.deleted_time {
        if now - deleted_time < DELETE_RETRY_FLOOR_SECONDS {
            return None;
        }
    }

    match machine.state {
        MachineState::Starting if now > machine.created_time + machinetype.max_starting_seconds => {
            Some(DeletionDecision { reason: Some("700 Failed to start".to_string()) })
        }
        MachineState::Failed | MachineState::Shutdown | MachineState::Deleting => Some(DeletionDecision { reason: None }),
        MachineState::Running => decide_running(machine, machinetype, space_shutdown_time, now),
        _ => None,
    }
}

fn decide_running(machine: &Machine, machinetype: &Machinetype, space_shutdown_time: Option<i64>, now: i64) -> Option<DeletionDecision> {
    let Some(started_time) = machine.started_time else { return None };

    if now > started_time + machinetype.max_wallclock_seconds {
        return Some(DeletionDecision { reason: Some("700 Exceeded max_wallclock_seconds".to_string()) });
    }

    if let (Some(heartbeat_seconds), Some(_)) = (machinetype.heartbeat_seconds, &machinetype.heartbeat_file) {
        let past_fizzle = now > started_time + machinetype.fizzle_seconds;
        let stale = machine.heartbeat_time.map(|t| t < now - heartbeat_seconds).unwrap_or(true);
        if past_fizzle && stale {
            return Some(DeletionDecision { reason: Some("700 Heartbeat file not updated".to_string()) });
        }
    }

    let effective_shutdown = match (space_shutdown_time, machine.shutdown_time_job) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    if let Some(effective_shutdown) = effective_shutdown {
        if now > effective_shutdown {
            return Some(DeletionDecision { reason: Some("700 Passed shutdowntime".to_string()) });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcycle_core::{ImageRef, MachineName, MachinetypeCounters};

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

    fn machine(state: MachineState) -> Machine {
        Machine {
            name: MachineName::from_string("vcycle-mt1-abcdefghij"),
            space_name: "s".into(),
            machinetype_name: "mt1".into(),
            state,
            ip: "0.0.0.0".into(),
            uuid: Some("uuid-1".into()),
            created_time: 0,
            started_time: Some(0),
            updated_time: 0,
            stopped_time: None,
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: None,
            processors: 2,
            hs06: None,
            manager: "host-a".into(),
            manager_heartbeat_time: 0,
            shutdown_time_job: None,
        }
    }

    #[test]
    fn starting_past_max_starting_seconds_is_deleted() {
        let m = machine(MachineState::Starting);
        let decision = decide(&m, &machinetype(), None, 3601).unwrap();
        assert_eq!(decision.reason.as_deref(), Some("700 Failed to start"));
    }

    #[test]
    fn starting_within_budget_is_kept() {
        let m = machine(MachineState::Starting);
        assert!(decide(&m, &machinetype(), None, 3000).is_none());
    }

    #[test]
    fn terminal_states_always_deleted_without_reason() {
        for state in [MachineState::Failed, MachineState::Shutdown, MachineState::Deleting] {
            let m = machine(state);
            let decision = decide(&m, &machinetype(), None, 10).unwrap();
            assert_eq!(decision.reason, None);
        }
    }

    #[test]
    fn recently_deleted_machine_is_not_retried_before_the_floor() {
        let mut m = machine(MachineState::Failed);
        m.deleted_time = Some(100);
        assert!(decide(&m, &machinetype(), None, 200).is_none());
        assert!(decide(&m, &machinetype(), None, 100 + 3600 + 1).is_some());
    }

    #[test]
    fn running_past_wallclock_is_deleted() {
        let mut mt = machinetype();
        mt.max_wallclock_seconds = 1000;
        let m = machine(MachineState::Running);
        let decision = decide(&m, &mt, None, 1001).unwrap();
        assert_eq!(decision.reason.as_deref(), Some("700 Exceeded max_wallclock_seconds"));
    }

    #[test]
    fn stale_heartbeat_past_fizzle_window_is_deleted() {
        let mut mt = machinetype();
        mt.heartbeat_file = Some("heartbeat".into());
        mt.heartbeat_seconds = Some(120);
        mt.fizzle_seconds = 600;
        let mut m = machine(MachineState::Running);
        m.heartbeat_time = Some(0);
        let decision = decide(&m, &mt, None, 601).unwrap();
        assert_eq!(decision.reason.as_deref(), Some("700 Heartbeat file not updated"));
    }

    #[test]
    fn fresh_heartbeat_keeps_machine() {
        let mut mt = machinetype();
        mt.heartbeat_file = Some("heartbeat".into());
        mt.heartbeat_seconds = Some(120);
        mt.fizzle_seconds = 600;
        let mut m = machine(MachineState::Running);
        m.heartbeat_time = Some(550);
        assert!(decide(&m, &mt, None, 601).is_none());
    }

    #[test]
    fn past_space_shutdown_time_is_deleted() {
        let m = machine(MachineState::Running);
        let decision = decide(&m, &machinetype(), Some(100), 101).unwrap();
        assert_eq!(decision.reason.as_deref(), Some("700 Passed shutdowntime"));
    }

    #[test]
    fn effective_shutdown_time_is_the_earlier_of_space_and_job() {
        let mut m = machine(MachineState::Running);
        m.shutdown_time_job = Some(50);
        // Space allows until 1000, but the job's own deadline at 50 should win.
        let decision = decide(&m, &machinetype(), Some(1000), 60).unwrap();
        assert_eq!(decision.reason.as_deref(), Some("700 Passed shutdowntime"));
    }
}
