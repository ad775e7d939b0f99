// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The abstract cloud backend interface (§4.2): an explicit capability
//! set selected by the `api` config string through a registry, replacing
//! the source's subclass-discovery-by-name dispatch (SPEC_FULL.md §9).

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http error: {0}")]
    Http(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("no matching flavor")]
    NoMatchingFlavor,
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("volume did not become available within timeout")]
    VolumeTimeout,
    #[error("not found: {0}")]
    NotFound(String),
}

/// A snapshot of one server as reported by the backend, sufficient input
/// for the classifier.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub name: String,
    pub uuid: String,
    pub flavor_id: String,
    pub address: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub launched_at: Option<String>,
    pub task_state: Option<String>,
    pub power_state: Option<i32>,
    pub status: String,
    pub machinetype: Option<String>,
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Flavor {
    pub id: String,
    pub mb: u32,
    pub processors: u32,
}

#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: String,
    pub flavor_id: String,
    pub image_id: String,
    pub key_pair_name: String,
    pub network_uuid: Option<String>,
    pub security_groups: Vec<String>,
    pub availability_zone: Option<String>,
    pub metadata: HashMap<String, String>,
    pub user_data: String,
    pub block_device_mapping: Option<BlockDeviceMapping>,
}

#[derive(Debug, Clone)]
pub struct BlockDeviceMapping {
    pub volume_id: String,
    pub delete_on_termination: bool,
}

/// The abstract operations the core calls on a backend (§4.2).
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), AdapterError>;
    async fn list_servers(&self) -> Result<Vec<ServerRecord>, AdapterError>;
    async fn list_flavors(&self) -> Result<HashMap<String, Flavor>, AdapterError>;
    async fn processors_limit(&self) -> Result<Option<u32>, AdapterError>;
    async fn find_image(&self, name_or_ref: &str) -> Result<Option<String>, AdapterError>;
    async fn upload_image(&self, file_path: &str, name: &str, last_modified: i64) -> Result<String, AdapterError>;
    async fn ensure_key_pair(&self, public_key: &str) -> Result<String, AdapterError>;
    /// Creates a volume and polls until `available`, 120s timeout / 10s interval (§4.2, §4.7).
    async fn create_volume(
        &self,
        name: &str,
        size_gib: u32,
        image_id: &str,
        zone: Option<&str>,
    ) -> Result<String, AdapterError>;
    /// Re-polls the same readiness check after creation, modelling the
    /// volume-attachable wait as an explicit predicate (§4.7 step 2, Open
    /// Question #1) instead of an unconditional sleep.
    async fn wait_until_attachable(&self, volume_id: &str) -> Result<(), AdapterError>;
    async fn create_server(&self, spec: ServerSpec) -> Result<String, AdapterError>;
    async fn delete_server(&self, uuid: &str) -> Result<(), AdapterError>;
    /// Deletes volumes whose name carries `name_prefix`, never a
    /// tenancy-wide sweep (§4.2, §9 Open Question #2).
    async fn delete_volumes_with_prefix(&self, name_prefix: &str) -> Result<(), AdapterError>;
}
