// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume (Cinder) calls: synchronous create-and-poll, and name-prefix
//! restricted bulk deletion (§4.2, §9 Open Question #2).

use super::identity::Endpoints;
use crate::cloud::AdapterError;
use serde_json::{json, Value};
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(10);

fn http_err(e: reqwest::Error) -> AdapterError {
    AdapterError::Http(e.to_string())
}

pub async fn create_volume(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    name: &str,
    size_gib: u32,
    image_id: &str,
    zone: Option<&str>,
) -> Result<String, AdapterError> {
    let mut volume = json!({
        "size": size_gib,
        "imageRef": image_id,
        "name": name,
    });
    if let Some(zone) = zone {
        volume["availability_zone"] = json!(zone);
    }

    let url = format!("{}/volumes", endpoints.volume_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .header("X-Auth-Token", &endpoints.token)
        .json(&json!({ "volume": volume }))
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(AdapterError::Http(format!("POST {url} returned {}", resp.status())));
    }
    let parsed: Value = resp.json().await.map_err(http_err)?;
    parsed["volume"]["id"].as_str().map(str::to_string).ok_or_else(|| AdapterError::Http("volume creation response missing id".into()))
}

/// Polls `/volumes/{id}` every [`POLL_INTERVAL`] until `status == "available"`
/// or [`POLL_TIMEOUT`] elapses.
pub async fn wait_until_available(client: &reqwest::Client, endpoints: &Endpoints, volume_id: &str) -> Result<(), AdapterError> {
    let url = format!("{}/volumes/{volume_id}", endpoints.volume_url.trim_end_matches('/'));
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;

    loop {
        let resp = client.get(&url).header("X-Auth-Token", &endpoints.token).send().await.map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(AdapterError::Http(format!("GET {url} returned {}", resp.status())));
        }
        let parsed: Value = resp.json().await.map_err(http_err)?;
        if parsed["volume"]["status"].as_str() == Some("available") {
            return Ok(());
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(AdapterError::VolumeTimeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Deletes every volume whose name starts with `name_prefix`. Never lists
/// volumes outside the tenancy's own project, and never deletes a volume
/// whose name does not carry the prefix (§9 Open Question #2).
pub async fn delete_volumes_with_prefix(client: &reqwest::Client, endpoints: &Endpoints, name_prefix: &str) -> Result<(), AdapterError> {
    let list_url = format!("{}/volumes/detail", endpoints.volume_url.trim_end_matches('/'));
    let resp = client.get(&list_url).header("X-Auth-Token", &endpoints.token).send().await.map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(AdapterError::Http(format!("GET {list_url} returned {}", resp.status())));
    }
    let parsed: Value = resp.json().await.map_err(http_err)?;

    for volume in parsed["volumes"].as_array().cloned().unwrap_or_default() {
        let name = volume["name"].as_str().unwrap_or_default();
        if !name.starts_with(name_prefix) {
            continue;
        }
        let Some(id) = volume["id"].as_str() else { continue };

        let delete_url = format!("{}/volumes/{id}", endpoints.volume_url.trim_end_matches('/'));
        let delete_resp = client.delete(&delete_url).header("X-Auth-Token", &endpoints.token).send().await.map_err(http_err)?;
        if !delete_resp.status().is_success() && delete_resp.status().as_u16() != 404 {
            tracing::warn!(volume = name, status = %delete_resp.status(), "failed to delete volume");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn poll_timeout_and_interval_are_sane() {
        assert!(super::POLL_TIMEOUT > super::POLL_INTERVAL);
        assert_eq!(super::POLL_TIMEOUT.as_secs(), 120);
        assert_eq!(super::POLL_INTERVAL.as_secs(), 10);
    }
}
