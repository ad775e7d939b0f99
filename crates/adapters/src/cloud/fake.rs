// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory [`CloudAdapter`] double for engine/daemon tests.

use super::{AdapterError, CloudAdapter, Flavor, ServerRecord, ServerSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FakeCall {
    pub method: &'static str,
    pub detail: String,
}

#[derive(Default)]
struct FakeState {
    servers: HashMap<String, ServerRecord>,
    flavors: HashMap<String, Flavor>,
    processors_limit: Option<u32>,
    calls: Vec<FakeCall>,
    fail_create_server: bool,
    fail_connect: bool,
}

/// Records every call made against it and lets tests pre-seed server
/// records and flavors, or force a failure injection point.
#[derive(Clone)]
pub struct FakeCloudAdapter {
    state: Arc<Mutex<FakeState>>,
    uuid_counter: Arc<AtomicU64>,
}

impl Default for FakeCloudAdapter {
    fn default() -> Self {
        Self { state: Arc::new(Mutex::new(FakeState::default())), uuid_counter: Arc::new(AtomicU64::new(1)) }
    }
}

impl FakeCloudAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flavor(self, name: &str, flavor: Flavor) -> Self {
        self.state.lock().flavors.insert(name.to_string(), flavor);
        self
    }

    pub fn with_processors_limit(self, limit: Option<u32>) -> Self {
        self.state.lock().processors_limit = limit;
        self
    }

    pub fn seed_server(&self, record: ServerRecord) {
        self.state.lock().servers.insert(record.uuid.clone(), record);
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    pub fn fail_next_create_server(&self) {
        self.state.lock().fail_create_server = true;
    }

    pub fn fail_connect(&self) {
        self.state.lock().fail_connect = true;
    }

    fn record(&self, method: &'static str, detail: impl Into<String>) {
        self.state.lock().calls.push(FakeCall { method, detail: detail.into() });
    }
}

#[async_trait]
impl CloudAdapter for FakeCloudAdapter {
    async fn connect(&self) -> Result<(), AdapterError> {
        self.record("connect", "");
        if self.state.lock().fail_connect {
            return Err(AdapterError::Auth("fake connect failure".into()));
        }
        Ok(())
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, AdapterError> {
        self.record("list_servers", "");
        Ok(self.state.lock().servers.values().cloned().collect())
    }

    async fn list_flavors(&self) -> Result<HashMap<String, Flavor>, AdapterError> {
        self.record("list_flavors", "");
        Ok(self.state.lock().flavors.clone())
    }

    async fn processors_limit(&self) -> Result<Option<u32>, AdapterError> {
        Ok(self.state.lock().processors_limit)
    }

    async fn find_image(&self, name_or_ref: &str) -> Result<Option<String>, AdapterError> {
        self.record("find_image", name_or_ref);
        Ok(Some(format!("image-{name_or_ref}")))
    }

    async fn upload_image(&self, _file_path: &str, name: &str, _last_modified: i64) -> Result<String, AdapterError> {
        self.record("upload_image", name);
        Ok(format!("image-{name}"))
    }

    async fn ensure_key_pair(&self, _public_key: &str) -> Result<String, AdapterError> {
        self.record("ensure_key_pair", "");
        Ok("vcycle".to_string())
    }

    async fn create_volume(
        &self,
        name: &str,
        size_gib: u32,
        _image_id: &str,
        _zone: Option<&str>,
    ) -> Result<String, AdapterError> {
        self.record("create_volume", format!("{name}:{size_gib}"));
        Ok(format!("vol-{name}"))
    }

    async fn wait_until_attachable(&self, volume_id: &str) -> Result<(), AdapterError> {
        self.record("wait_until_attachable", volume_id);
        Ok(())
    }

    async fn create_server(&self, spec: ServerSpec) -> Result<String, AdapterError> {
        self.record("create_server", spec.name.clone());
        if self.state.lock().fail_create_server {
            self.state.lock().fail_create_server = false;
            return Err(AdapterError::Http("fake create_server failure".into()));
        }
        let uuid = format!("uuid-{}", self.uuid_counter.fetch_add(1, Ordering::SeqCst));
        self.state.lock().servers.insert(
            uuid.clone(),
            ServerRecord {
                name: spec.name,
                uuid: uuid.clone(),
                flavor_id: spec.flavor_id,
                address: Some("0.0.0.0".into()),
                created: None,
                updated: None,
                launched_at: None,
                task_state: None,
                power_state: None,
                status: "BUILD".into(),
                machinetype: spec.metadata.get("machinetype").cloned(),
                availability_zone: spec.availability_zone,
            },
        );
        Ok(uuid)
    }

    async fn delete_server(&self, uuid: &str) -> Result<(), AdapterError> {
        self.record("delete_server", uuid);
        self.state.lock().servers.remove(uuid);
        Ok(())
    }

    async fn delete_volumes_with_prefix(&self, name_prefix: &str) -> Result<(), AdapterError> {
        self.record("delete_volumes_with_prefix", name_prefix);
        Ok(())
    }
}
