// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `lastAbortTime` persistence with max-merge semantics: the file only ever
//! increases, so concurrent writers from different manager processes
//! converge regardless of write order (SPEC_FULL.md §4.4, §9).

use crate::error::StoreError;
use crate::machine_store;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct LastAbortTimes {
    root: PathBuf,
}

impl LastAbortTimes {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn dir(&self, space: &str) -> PathBuf {
        self.root.join(space)
    }

    pub fn get(&self, space: &str, machinetype: &str) -> i64 {
        machine_store::read(&self.dir(space), machinetype).and_then(|s| s.parse().ok()).unwrap_or(0)
    }

    /// Persists `candidate` only if it is larger than the current value
    /// (`lastAbortTime` never decreases). Returns the value now on disk.
    pub fn set_if_larger(&self, space: &str, machinetype: &str, candidate: i64) -> Result<i64, StoreError> {
        let current = self.get(space, machinetype);
        if candidate <= current {
            return Ok(current);
        }
        machine_store::write(&self.dir(space), machinetype, candidate.to_string().as_bytes(), 0o640)?;
        Ok(candidate)
    }

    fn fizzle_key(machinetype: &str) -> String {
        format!("{machinetype}.fizzle")
    }

    /// Whether the most recently recorded abort for `machinetype` was itself
    /// a fizzle (stopped before `fizzle_seconds`), driving the allocator's
    /// fizzle-latch gate (§4.6) across cycle boundaries. Unset defaults to
    /// `false`.
    pub fn is_last_abort_fizzle(&self, space: &str, machinetype: &str) -> bool {
        machine_store::read(&self.dir(space), &Self::fizzle_key(machinetype)).as_deref() == Some("1")
    }

    /// Like [`LastAbortTimes::set_if_larger`], but also records whether this
    /// abort was a fizzle. Only updates the fizzle flag when `candidate` is
    /// actually applied, keeping it in lockstep with the timestamp it
    /// describes.
    pub fn set_if_larger_with_kind(&self, space: &str, machinetype: &str, candidate: i64, is_fizzle: bool) -> Result<i64, StoreError> {
        let current = self.get(space, machinetype);
        if candidate <= current {
            return Ok(current);
        }
        machine_store::write(&self.dir(space), machinetype, candidate.to_string().as_bytes(), 0o640)?;
        machine_store::write(&self.dir(space), &Self::fizzle_key(machinetype), if is_fizzle { b"1" } else { b"0" }, 0o640)?;
        Ok(candidate)
    }
}
