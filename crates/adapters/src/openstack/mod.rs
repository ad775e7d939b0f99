// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The concrete OpenStack implementation of [`CloudAdapter`] (§4.2):
//! Identity v2/v3 token auth, Compute, Image (Glance v1/v2), and Volume
//! (Cinder) over HTTP(S) with a 90s per-request timeout and TLSv1 minimum
//! (§5, §6).

mod compute;
mod identity;
mod image;
mod volume;

pub use identity::Endpoints;

use crate::cloud::{AdapterError, CloudAdapter, Flavor, ServerRecord, ServerSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct OpenStackConfig {
    pub identity_url: String,
    pub api_version: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    pub domain_name: Option<String>,
    pub region: Option<String>,
    /// Where to cache the discovered token for operator convenience (§4.2).
    pub token_cache_path: Option<std::path::PathBuf>,
}

pub struct OpenStackAdapter {
    client: reqwest::Client,
    config: OpenStackConfig,
    endpoints: Mutex<Option<Endpoints>>,
}

impl OpenStackAdapter {
    pub fn new(config: OpenStackConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .min_tls_version(reqwest::tls::Version::TLS_1_0)
            .build()
            .map_err(|e| AdapterError::Http(e.to_string()))?;
        Ok(Self { client, config, endpoints: Mutex::new(None) })
    }

    fn endpoints(&self) -> Result<Endpoints, AdapterError> {
        self.endpoints.lock().clone().ok_or_else(|| AdapterError::Auth("not connected".into()))
    }
}

#[async_trait]
impl CloudAdapter for OpenStackAdapter {
    async fn connect(&self) -> Result<(), AdapterError> {
        let endpoints = if self.config.api_version.starts_with('2') {
            identity::authenticate_v2(&self.client, &self.config).await?
        } else {
            identity::authenticate_v3(&self.client, &self.config).await?
        };
        if let Some(path) = &self.config.token_cache_path {
            let _ = std::fs::write(path, &endpoints.token);
        }
        *self.endpoints.lock() = Some(endpoints);
        Ok(())
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, AdapterError> {
        compute::list_servers(&self.client, &self.endpoints()?).await
    }

    async fn list_flavors(&self) -> Result<HashMap<String, Flavor>, AdapterError> {
        compute::list_flavors(&self.client, &self.endpoints()?).await
    }

    async fn processors_limit(&self) -> Result<Option<u32>, AdapterError> {
        compute::processors_limit(&self.client, &self.endpoints()?).await
    }

    async fn find_image(&self, name_or_ref: &str) -> Result<Option<String>, AdapterError> {
        image::find_image(&self.client, &self.endpoints()?, name_or_ref).await
    }

    async fn upload_image(&self, file_path: &str, name: &str, last_modified: i64) -> Result<String, AdapterError> {
        image::upload_image(&self.client, &self.endpoints()?, file_path, name, last_modified).await
    }

    async fn ensure_key_pair(&self, public_key: &str) -> Result<String, AdapterError> {
        compute::ensure_key_pair(&self.client, &self.endpoints()?, public_key).await
    }

    async fn create_volume(
        &self,
        name: &str,
        size_gib: u32,
        image_id: &str,
        zone: Option<&str>,
    ) -> Result<String, AdapterError> {
        volume::create_volume(&self.client, &self.endpoints()?, name, size_gib, image_id, zone).await
    }

    async fn wait_until_attachable(&self, volume_id: &str) -> Result<(), AdapterError> {
        volume::wait_until_available(&self.client, &self.endpoints()?, volume_id).await
    }

    async fn create_server(&self, spec: ServerSpec) -> Result<String, AdapterError> {
        compute::create_server(&self.client, &self.endpoints()?, spec).await
    }

    async fn delete_server(&self, uuid: &str) -> Result<(), AdapterError> {
        compute::delete_server(&self.client, &self.endpoints()?, uuid).await
    }

    async fn delete_volumes_with_prefix(&self, name_prefix: &str) -> Result<(), AdapterError> {
        volume::delete_volumes_with_prefix(&self.client, &self.endpoints()?, name_prefix).await
    }
}
