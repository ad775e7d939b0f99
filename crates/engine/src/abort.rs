// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fizzle and abort-time tracking (SPEC_FULL.md §4.4): on first observation
//! of a machine in a terminal state, decide whether its stop should push
//! `lastAbortTime` forward, then persist through the store's monotonic
//! setter.

use vcycle_core::Machine;
use vcycle_store::LastAbortTimes;

/// Returns the candidate `lastAbortTime` this machine's stop implies, or
/// `None` if it implies no back-off update. Call only on the cycle where
/// `stopped_time` is first observed (the classifier guarantees this is set
/// exactly once), otherwise the same machine would re-trigger back-off
/// every cycle thereafter.
pub fn abort_candidate(machine: &Machine, fizzle_seconds: i64) -> Option<i64> {
    let stopped_time = machine.stopped_time?;

    if machine.shutdown_code().is_some() {
        return Some(stopped_time);
    }
    if machine.fizzled(fizzle_seconds) {
        return Some(stopped_time);
    }
    None
}

/// Applies [`abort_candidate`] and persists it through the store's
/// max-merge setter, returning the value now on disk (which may be larger
/// than `candidate` if a peer already wrote ahead of us).
///
/// Also persists whether this abort was itself a fizzle, so the allocator's
/// fizzle-latch gate (§4.6) can be reconstructed from disk on the next
/// cycle instead of needing an in-memory counter to survive across cycles.
pub fn record_abort_if_applicable(
    last_abort_times: &LastAbortTimes,
    space: &str,
    machinetype: &str,
    machine: &Machine,
    fizzle_seconds: i64,
) -> Result<Option<i64>, vcycle_store::StoreError> {
    let Some(candidate) = abort_candidate(machine, fizzle_seconds) else { return Ok(None) };
    let is_fizzle = machine.fizzled(fizzle_seconds);
    let applied = last_abort_times.set_if_larger_with_kind(space, machinetype, candidate, is_fizzle)?;
    Ok(Some(applied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcycle_core::{MachineName, MachineState};

    fn sample() -> Machine {
        Machine {
            name: MachineName::from_string("vcycle-mt1-abcdefghij"),
            space_name: "s".into(),
            machinetype_name: "mt1".into(),
            state: MachineState::Shutdown,
            ip: "0.0.0.0".into(),
            uuid: Some("uuid-1".into()),
            created_time: 90,
            started_time: Some(100),
            updated_time: 300,
            stopped_time: Some(300),
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: None,
            processors: 2,
            hs06: None,
            manager: "host-a".into(),
            manager_heartbeat_time: 300,
            shutdown_time_job: None,
        }
    }

    #[test]
    fn coded_shutdown_message_in_range_updates_abort_time() {
        let mut m = sample();
        m.shutdown_message = Some("503 Service Unavailable".into());
        assert_eq!(abort_candidate(&m, 600), Some(300));
    }

    #[test]
    fn out_of_range_code_falls_back_to_timing_rule() {
        let mut m = sample();
        // 700 is outside [300, 699]; falls back to the fizzle-by-timing check.
        m.shutdown_message = Some("700 Failed to start".into());
        // started 100, stopped 300: ran 200s < fizzle_seconds 600 -> fizzled.
        assert_eq!(abort_candidate(&m, 600), Some(300));
        // With a shorter fizzle window it ran long enough not to fizzle.
        assert_eq!(abort_candidate(&m, 100), None);
    }

    #[test]
    fn no_stopped_time_means_no_candidate() {
        let mut m = sample();
        m.stopped_time = None;
        assert_eq!(abort_candidate(&m, 600), None);
    }

    #[test]
    fn record_abort_persists_through_max_merge() {
        let dir = tempfile::tempdir().unwrap();
        let last_abort_times = LastAbortTimes::new(dir.path().to_path_buf());
        let mut m = sample();
        m.shutdown_message = Some("503 x".into());
        let applied = record_abort_if_applicable(&last_abort_times, "s", "mt1", &m, 600).unwrap();
        assert_eq!(applied, Some(300));
        assert_eq!(last_abort_times.get("s", "mt1"), 300);
    }

    #[test]
    fn fizzle_flag_survives_across_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let last_abort_times = LastAbortTimes::new(dir.path().to_path_buf());
        let m = sample(); // started 100, stopped 300: ran 200s, fizzles under a 600s window.
        record_abort_if_applicable(&last_abort_times, "s", "mt1", &m, 600).unwrap();
        assert!(last_abort_times.is_last_abort_fizzle("s", "mt1"));

        let mut coded = sample();
        coded.shutdown_message = Some("503 x".into());
        coded.stopped_time = Some(1000);
        record_abort_if_applicable(&last_abort_times, "s", "mt1", &coded, 600).unwrap();
        assert!(!last_abort_times.is_last_abort_fizzle("s", "mt1"), "a coded shutdown is not a fizzle");
    }
}
