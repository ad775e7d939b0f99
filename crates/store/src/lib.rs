// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable, rename(2)-based state store: a rooted directory tree
//! acting as the single source of truth between cycles and across peer
//! managers (SPEC_FULL.md §4.1).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod apel;
mod error;
mod heartbeat_list;
mod last_abort;
mod machine_store;

pub use apel::ApelRecord;
pub use error::StoreError;
pub use last_abort::LastAbortTimes;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A handle onto the on-disk tree rooted at `state_directory`. Cheap to
/// clone (it carries only a `PathBuf`); every space's cycle task gets its
/// own clone and only ever touches its own `spaces/<space>/` subtree, so no
/// internal locking is required (SPEC_FULL.md §4.1, §5).
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn space_root(&self, space: &str) -> PathBuf {
        self.root.join("spaces").join(space)
    }

    pub fn current_dir(&self, space: &str) -> PathBuf {
        self.space_root(space).join("current")
    }

    pub fn deleted_dir(&self, space: &str) -> PathBuf {
        self.space_root(space).join("deleted")
    }

    pub fn machine_dir(&self, space: &str, machine: &str) -> PathBuf {
        self.current_dir(space).join(machine)
    }

    /// Reads a single machine attribute file; read errors (including
    /// not-found) are swallowed and reported as `None`, matching §4.1's
    /// "all operations swallow read errors" failure mode.
    pub fn get(&self, space: &str, machine: &str, key: &str) -> Option<String> {
        machine_store::read(&self.machine_dir(space, machine), key)
    }

    /// Atomically writes a machine attribute file via temp-file + rename in
    /// a sibling `tmp/` directory (§4.1, §9 "rename(2) semantics").
    pub fn put(&self, space: &str, machine: &str, key: &str, contents: &[u8], mode: u32) -> Result<(), StoreError> {
        machine_store::write(&self.machine_dir(space, machine), key, contents, mode)
    }

    /// Like [`StateStore::put`] for a nested attribute such as
    /// `machinefeatures/shutdowntime`.
    pub fn put_nested(
        &self,
        space: &str,
        machine: &str,
        subdir: &str,
        key: &str,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), StoreError> {
        let dir = self.machine_dir(space, machine).join(subdir);
        machine_store::write(&dir, key, contents, mode)
    }

    pub fn get_nested(&self, space: &str, machine: &str, subdir: &str, key: &str) -> Option<String> {
        let dir = self.machine_dir(space, machine).join(subdir);
        machine_store::read(&dir, key)
    }

    pub fn list_machines(&self, space: &str) -> Result<HashSet<String>, StoreError> {
        machine_store::list_dirs(&self.current_dir(space))
    }

    pub fn list_deleted(&self, space: &str) -> Result<HashSet<String>, StoreError> {
        machine_store::list_dirs(&self.deleted_dir(space))
    }

    /// Renames a machine's tree from `current/` into `deleted/` (§4.1).
    pub fn move_to_deleted(&self, space: &str, machine: &str) -> Result<(), StoreError> {
        let from = self.machine_dir(space, machine);
        let to_dir = self.deleted_dir(space);
        std::fs::create_dir_all(&to_dir)?;
        let to = to_dir.join(machine);
        std::fs::rename(from, to)?;
        Ok(())
    }

    /// Removes deleted-machine trees whose mtime is older than
    /// `cleanup_hours × 3600` (§4.1).
    pub fn purge_deleted(&self, space: &str, cleanup_hours: u32, now_epoch_seconds: i64) -> Result<Vec<String>, StoreError> {
        let cutoff = now_epoch_seconds - (cleanup_hours as i64) * 3600;
        let dir = self.deleted_dir(space);
        let mut purged = Vec::new();
        if !dir.exists() {
            return Ok(purged);
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(i64::MAX);
            if mtime < cutoff {
                std::fs::remove_dir_all(&path)?;
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    purged.push(name.to_string());
                }
            }
        }
        Ok(purged)
    }

    pub fn last_abort_times(&self) -> LastAbortTimes {
        LastAbortTimes::new(self.root.join("shared").join("last_abort_times"))
    }

    pub fn heartbeat_list_path(&self, space: &str, machinetype: &str) -> PathBuf {
        self.root
            .join("shared")
            .join("spaces")
            .join(space)
            .join("heartbeatlists")
            .join(machinetype)
    }

    /// Rewrites a machinetype's heartbeat-list file wholesale (§4.11).
    pub fn write_heartbeat_list(&self, space: &str, machinetype: &str, lines: &[String]) -> Result<(), StoreError> {
        heartbeat_list::write(&self.heartbeat_list_path(space, machinetype), lines)
    }

    pub fn read_heartbeat_list(&self, space: &str, machinetype: &str) -> Vec<heartbeat_list::HeartbeatEntry> {
        heartbeat_list::read(&self.heartbeat_list_path(space, machinetype))
    }

    /// Writes an APEL record to both the archive and outgoing trees (§4.10).
    pub fn write_apel_record(&self, day: &str, machine: &str, record: &ApelRecord) -> Result<(), StoreError> {
        apel::write(&self.root, day, machine, record)
    }
}

pub use heartbeat_list::HeartbeatEntry;
