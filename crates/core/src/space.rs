// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`Space`] domain type: one tenancy on one backend, owning its
//! machinetypes directly rather than through a cyclic machine↔space
//! reference (SPEC_FULL.md §3, §9 "Cyclic reference machine↔space").

use crate::machinetype::Machinetype;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacmonEndpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub name: String,
    pub api: String,
    pub api_version: String,
    pub credentials: SpaceCredentials,
    pub processors_limit: Option<u32>,
    pub flavor_names: Vec<String>,
    pub volume_gb_per_processor: u32,
    pub shutdown_time: Option<i64>,
    pub gocdb_sitename: Option<String>,
    pub vacmon_endpoints: Vec<VacmonEndpoint>,
    pub https_host: Option<String>,
    pub https_port: u16,
    pub cleanup_hours: u32,
    /// Declaration order is preserved (an [`IndexMap`]) so that fair-share
    /// tie-breaking over machinetype iteration order is deterministic given
    /// a fixed RNG seed, mirroring the source's dict-insertion-order reliance.
    pub machinetypes: IndexMap<String, Machinetype>,

    /// Running totals for the space, recomputed each cycle from the classifier's scan.
    #[serde(skip)]
    pub total_machines: u32,
    #[serde(skip)]
    pub total_processors: u32,
    #[serde(skip)]
    pub total_hs06: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceCredentials {
    pub project_name: String,
    pub domain_name: Option<String>,
    pub username: String,
    pub password: String,
    pub identity_url: String,
    pub network_uuid: Option<String>,
    pub region: Option<String>,
    pub security_groups: Vec<String>,
}

impl Space {
    pub fn default_https_port() -> u16 {
        443
    }

    pub fn default_cleanup_hours() -> u32 {
        72
    }

    /// True once `shutdown_time` has passed; the allocator returns
    /// immediately in this state (§4.6).
    pub fn past_shutdown_time(&self, now: i64) -> bool {
        self.shutdown_time.map(|t| now >= t).unwrap_or(false)
    }
}
