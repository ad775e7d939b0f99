// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The heartbeat tracker (SPEC_FULL.md §4.11): pulls guest-reported
//! liveness out of `joboutputs/<heartbeat_file>` and republishes the live
//! set as the heartbeat-list file a sibling machinetype's CVMFS-proxy
//! injection (§4.7 step 5) reads.

use vcycle_core::Machine;
use vcycle_store::{HeartbeatEntry, StateStore, StoreError};

/// Reads `joboutputs/<heartbeat_file>` for one `Running` machine and, if it
/// parses as an epoch-seconds integer newer than the persisted value,
/// updates `machine.heartbeat_time` and returns `true`. A missing file or
/// unparsable content is silently treated as "no new heartbeat" (§4.11).
pub fn poll_one(store: &StateStore, space: &str, machine: &mut Machine, heartbeat_file: &str) -> bool {
    let Some(raw) = store.get_nested(space, machine.name.as_str(), "joboutputs", heartbeat_file) else {
        return false;
    };
    let Ok(epoch) = raw.trim().parse::<i64>() else { return false };
    if machine.heartbeat_time.map(|previous| epoch > previous).unwrap_or(true) {
        machine.heartbeat_time = Some(epoch);
        true
    } else {
        false
    }
}

/// Rewrites `<root>/shared/spaces/<space>/heartbeatlists/<machinetype>`
/// wholesale with every machine carrying a heartbeat newer than
/// `now - heartbeat_seconds * 3`, newest-first.
pub fn rewrite_heartbeat_list(
    store: &StateStore,
    space: &str,
    machinetype: &str,
    machines: &[Machine],
    heartbeat_seconds: i64,
    now: i64,
) -> Result<(), StoreError> {
    let cutoff = now - heartbeat_seconds * 3;
    let mut entries: Vec<HeartbeatEntry> = machines
        .iter()
        .filter_map(|m| {
            m.heartbeat_time
                .filter(|&t| t > cutoff)
                .map(|t| HeartbeatEntry { heartbeat_epoch: t, name: m.name.as_str().to_string(), ip: m.ip.clone() })
        })
        .collect();
    entries.sort_by(|a, b| b.heartbeat_epoch.cmp(&a.heartbeat_epoch));
    let lines: Vec<String> = entries.into_iter().map(|e| format!("{} {} {}", e.heartbeat_epoch, e.name, e.ip)).collect();
    store.write_heartbeat_list(space, machinetype, &lines)
}
