// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The VM classifier: a pure function mapping a cloud-reported
//! [`ServerRecord`] into a canonical [`MachineState`] plus the derived
//! timestamps that should be merged into the persisted [`Machine`]
//! (SPEC_FULL.md §4.3).

use chrono::DateTime;
use vcycle_adapters::ServerRecord;
use vcycle_core::{Machine, MachineState};

/// The result of classifying one observation. Carries only the fields the
/// classifier itself decides; the caller merges these into the persisted
/// [`Machine`] and leaves everything else untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyOutcome {
    pub state: MachineState,
    pub ip: String,
    pub created_time: i64,
    pub updated_time: i64,
    /// `Some` only on the observation that first establishes it; `None`
    /// means "leave the previously-persisted value as-is".
    pub started_time: Option<i64>,
    /// `Some` only on the observation that first transitions into a
    /// terminal state; `None` means "leave as-is".
    pub stopped_time: Option<i64>,
    pub processors: u32,
}

/// Classifies one cloud observation. `previous` is the last persisted
/// `Machine`, or `None` on first sighting. Performs no I/O, so applying it
/// twice against the same `(previous, record, now)` is idempotent (§8).
pub fn classify(previous: Option<&Machine>, record: &ServerRecord, flavor_processors: u32, now: i64) -> ClassifyOutcome {
    let state = state_from_record(record);

    let created_time = parse_rfc3339(record.created.as_deref()).unwrap_or(now);
    let updated_time = parse_rfc3339(record.updated.as_deref()).unwrap_or(now);
    let launched_time = parse_rfc3339(record.launched_at.as_deref());

    let already_started = previous.and_then(|m| m.started_time);
    let started_time = match (already_started, launched_time) {
        (Some(_), _) => None,
        (None, Some(launched)) => Some(launched),
        (None, None) if state == MachineState::Running => Some(now),
        (None, None) => None,
    };

    let already_stopped = previous.and_then(|m| m.stopped_time);
    let stopped_time = if already_stopped.is_none() && state.is_terminal() { Some(updated_time) } else { None };

    ClassifyOutcome {
        state,
        ip: record.address.clone().unwrap_or_else(|| "0.0.0.0".to_string()),
        created_time,
        updated_time,
        started_time,
        stopped_time,
        processors: flavor_processors,
    }
}

fn state_from_record(record: &ServerRecord) -> MachineState {
    if record.task_state.as_deref() == Some("Deleting") {
        return MachineState::Deleting;
    }
    match (record.status.as_str(), record.power_state) {
        ("ACTIVE", Some(1)) => MachineState::Running,
        ("BUILD", _) | ("ACTIVE", _) => MachineState::Starting,
        ("SHUTOFF", _) => MachineState::Shutdown,
        ("ERROR", _) => MachineState::Failed,
        ("DELETED", _) => MachineState::Deleting,
        _ => MachineState::Unknown,
    }
}

fn parse_rfc3339(raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: &str, power_state: Option<i32>, task_state: Option<&str>) -> ServerRecord {
        ServerRecord {
            name: "vcycle-mt1-abcdefghij".into(),
            uuid: "uuid-1".into(),
            flavor_id: "1".into(),
            address: Some("10.0.0.5".into()),
            created: Some("2026-01-01T00:00:00Z".into()),
            updated: Some("2026-01-01T00:05:00Z".into()),
            launched_at: None,
            task_state: task_state.map(str::to_string),
            power_state,
            status: status.into(),
            machinetype: Some("mt1".into()),
            availability_zone: None,
        }
    }

    #[test]
    fn active_and_running_power_state_is_running() {
        let outcome = classify(None, &record("ACTIVE", Some(1), None), 2, 1_000);
        assert_eq!(outcome.state, MachineState::Running);
        assert_eq!(outcome.started_time, Some(1_000));
    }

    #[test]
    fn build_is_starting() {
        let outcome = classify(None, &record("BUILD", None, None), 2, 1_000);
        assert_eq!(outcome.state, MachineState::Starting);
        assert_eq!(outcome.started_time, None);
    }

    #[test]
    fn deleting_task_state_overrides_status() {
        let outcome = classify(None, &record("ACTIVE", Some(1), Some("Deleting")), 2, 1_000);
        assert_eq!(outcome.state, MachineState::Deleting);
    }

    #[test]
    fn unrecognised_status_is_unknown() {
        let outcome = classify(None, &record("REBUILD", None, None), 2, 1_000);
        assert_eq!(outcome.state, MachineState::Unknown);
    }

    #[test]
    fn stopped_time_set_once_on_first_terminal_observation() {
        let first = classify(None, &record("SHUTOFF", None, None), 2, 1_000);
        assert_eq!(first.stopped_time, Some(parse_rfc3339(Some("2026-01-01T00:05:00Z")).unwrap()));

        let previous = Machine {
            name: vcycle_core::MachineName::from_string("vcycle-mt1-abcdefghij"),
            space_name: "s".into(),
            machinetype_name: "mt1".into(),
            state: MachineState::Shutdown,
            ip: "10.0.0.5".into(),
            uuid: Some("uuid-1".into()),
            created_time: 900,
            started_time: Some(950),
            updated_time: 990,
            stopped_time: first.stopped_time,
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: None,
            processors: 2,
            hs06: None,
            manager: "host-a".into(),
            manager_heartbeat_time: 990,
            shutdown_time_job: None,
        };
        let second = classify(Some(&previous), &record("SHUTOFF", None, None), 2, 1_200);
        assert_eq!(second.stopped_time, None, "already-stopped time is not overwritten");
    }

    #[test]
    fn classification_is_idempotent() {
        let r = record("ACTIVE", Some(1), None);
        let first = classify(None, &r, 2, 1_000);
        let previous = Machine {
            name: vcycle_core::MachineName::from_string("vcycle-mt1-abcdefghij"),
            space_name: "s".into(),
            machinetype_name: "mt1".into(),
            state: first.state,
            ip: first.ip.clone(),
            uuid: Some("uuid-1".into()),
            created_time: first.created_time,
            started_time: first.started_time,
            updated_time: first.updated_time,
            stopped_time: first.stopped_time,
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: None,
            processors: 2,
            hs06: None,
            manager: "host-a".into(),
            manager_heartbeat_time: first.updated_time,
            shutdown_time_job: None,
        };
        let second = classify(Some(&previous), &r, 2, 1_050);
        assert_eq!(second.state, first.state);
        assert_eq!(second.started_time, None);
    }
}
