// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`Machine`] domain type and its lifecycle state machine (SPEC_FULL.md §3, §4.3).

use crate::ids::MachineName;
use serde::{Deserialize, Serialize};

/// Canonical VM lifecycle states (§4.3). Exactly one is current at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Unknown,
    Starting,
    Running,
    Shutdown,
    Deleting,
    Failed,
}

crate::simple_display! {
    MachineState {
        Unknown => "unknown",
        Starting => "starting",
        Running => "running",
        Shutdown => "shutdown",
        Deleting => "deleting",
        Failed => "failed",
    }
}

impl MachineState {
    /// States in which the deletion policy (§4.5) considers the machine already stopped.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown | Self::Failed | Self::Deleting)
    }
}

/// One VM instance, backed by a directory of small files in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub name: MachineName,
    pub space_name: String,
    pub machinetype_name: String,
    pub state: MachineState,
    #[serde(default = "default_ip")]
    pub ip: String,
    pub uuid: Option<String>,
    pub created_time: i64,
    pub started_time: Option<i64>,
    pub updated_time: i64,
    pub stopped_time: Option<i64>,
    pub deleted_time: Option<i64>,
    pub heartbeat_time: Option<i64>,
    pub shutdown_message: Option<String>,
    pub shutdown_message_time: Option<i64>,
    pub zone: Option<String>,
    pub processors: u32,
    pub hs06: Option<f64>,
    pub manager: String,
    pub manager_heartbeat_time: i64,
    /// The `jobfeatures/shutdowntime_job` value minted at creation: the
    /// earlier of `created_time + max_wallclock_seconds` and the space's own
    /// `shutdown_time` (§4.5 rule 5, §4.7 step 6).
    pub shutdown_time_job: Option<i64>,
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

impl Machine {
    /// True when this process is the acknowledged owner of the machine.
    pub fn managed_here(&self, local_hostname: &str) -> bool {
        self.manager == local_hostname
    }

    /// A VM fizzles when it reaches a terminal state before running
    /// `fizzle_seconds` past `started_time` (§4.4).
    pub fn fizzled(&self, fizzle_seconds: i64) -> bool {
        match (self.started_time, self.stopped_time) {
            (Some(started), Some(stopped)) => (stopped - started) < fizzle_seconds,
            // Never started before stopping: unambiguously a fizzle.
            (None, Some(_)) => true,
            _ => false,
        }
    }

    /// Parses a leading 3-digit code from `shutdown_message`, if present (§4.4).
    pub fn shutdown_code(&self) -> Option<u16> {
        let msg = self.shutdown_message.as_deref()?;
        let code_str = msg.get(0..3)?;
        let code: u16 = code_str.parse().ok()?;
        (300..=699).contains(&code).then_some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Machine {
        Machine {
            name: MachineName::from_string("vcycle-mt1-abcdefghij"),
            space_name: "space1".into(),
            machinetype_name: "mt1".into(),
            state: MachineState::Running,
            ip: default_ip(),
            uuid: Some("uuid-1".into()),
            created_time: 100,
            started_time: Some(150),
            updated_time: 150,
            stopped_time: None,
            deleted_time: None,
            heartbeat_time: None,
            shutdown_message: None,
            shutdown_message_time: None,
            zone: None,
            processors: 2,
            hs06: None,
            manager: "host-a".into(),
            manager_heartbeat_time: 150,
            shutdown_time_job: None,
        }
    }

    #[test]
    fn managed_here_matches_hostname() {
        let m = sample();
        assert!(m.managed_here("host-a"));
        assert!(!m.managed_here("host-b"));
    }

    #[test]
    fn fizzle_detection() {
        let mut m = sample();
        m.stopped_time = Some(200); // 50s after start
        assert!(m.fizzled(600));
        assert!(!m.fizzled(40));
    }

    #[test]
    fn shutdown_code_extraction() {
        let mut m = sample();
        // 700 is a deletion-policy reason code, not a job abort code: it
        // falls outside [300, 699] so the fizzle rule falls back to timing.
        m.shutdown_message = Some("700 Failed to start".into());
        assert_eq!(m.shutdown_code(), None);
        m.shutdown_message = Some("503 Service Unavailable".into());
        assert_eq!(m.shutdown_code(), Some(503));
        m.shutdown_message = Some("not a code".into());
        assert_eq!(m.shutdown_code(), None);
    }
}
