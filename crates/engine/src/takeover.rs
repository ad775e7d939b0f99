// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The peer-takeover protocol (SPEC_FULL.md §4.8): lets a manager claim
//! an abandoned machine whose owner has stopped heartbeating, with jitter so
//! competing managers don't pile onto the same machine in lockstep.

use rand::Rng;
use vcycle_core::Machine;

const TAKE_SECONDS: i64 = 3600;

/// Whether `machine` is eligible for takeover right now. `jitter` must be
/// drawn fresh from `[0, 1)` per machine per cycle (not reused across
/// machines) so that abandoned machines spread across would-be owners
/// instead of all becoming claimable at the same instant.
pub fn is_abandoned(machine: &Machine, local_hostname: &str, now: i64, jitter: f64) -> bool {
    if machine.managed_here(local_hostname) {
        return false;
    }
    let threshold = now - (TAKE_SECONDS as f64 * (1.0 + jitter)) as i64;
    machine.manager_heartbeat_time < threshold
}

/// Draws the per-attempt jitter. Centralised so callers don't reseed an RNG
/// per machine.
pub fn draw_jitter(rng: &mut impl Rng) -> f64 {
    rng.gen_range(0.0..1.0)
}

/// Attempts to take over `machine`, returning the updated record on success.
/// The caller is responsible for persisting `manager`/`manager_heartbeat`
/// atomically (e.g. a compare-and-swap against the state store) and for
/// accepting a lost race silently (§4.8: "the operation is advisory").
pub fn take_over(machine: &mut Machine, local_hostname: &str, now: i64) {
    machine.manager = local_hostname.to_string();
    machine.manager_heartbeat_time = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcycle_core::{MachineName, MachineState};

    fn sample(manager: &str, manager_heartbeat_time: i64) -> Machine {
        Machine {
            name: MachineName::from_string("vcycle-mt1-abcdefghij"),
            space_name: "s".into(),
            machinetype_name: "mt1".into(),
            state: MachineState::Running,
            ip: "10.0.0.1".into(),
            uuid: Some("uuid-1".into()),
            created_time: 0,
            started_time: Some(0),
            updated_time: manager_heartbeat_time,
            stopped_time: None,
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: None,
            processors: 2,
            hs06: None,
            manager: manager.to_string(),
            manager_heartbeat_time,
            shutdown_time_job: None,
        }
    }

    #[test]
    fn owned_machine_is_never_abandoned() {
        let m = sample("host-a", 0);
        assert!(!is_abandoned(&m, "host-a", 100_000, 0.0));
    }

    #[test]
    fn stale_peer_machine_is_abandoned_with_zero_jitter() {
        let m = sample("host-b", 0);
        assert!(is_abandoned(&m, "host-a", TAKE_SECONDS + 1, 0.0));
    }

    #[test]
    fn jitter_extends_the_grace_period() {
        let m = sample("host-b", 0);
        // At exactly TAKE_SECONDS with jitter pushing the threshold earlier,
        // the peer is not yet abandoned.
        assert!(!is_abandoned(&m, "host-a", TAKE_SECONDS, 0.5));
    }

    #[test]
    fn take_over_rewrites_manager_and_heartbeat() {
        let mut m = sample("host-b", 0);
        take_over(&mut m, "host-a", 12_345);
        assert_eq!(m.manager, "host-a");
        assert_eq!(m.manager_heartbeat_time, 12_345);
    }
}
