// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity v2 (`/tokens`) and v3 (`/auth/tokens`) token authentication and
//! service-catalogue discovery.

use super::OpenStackConfig;
use crate::cloud::AdapterError;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub token: String,
    pub compute_url: String,
    pub image_url: String,
    pub volume_url: String,
}

fn http_err(e: reqwest::Error) -> AdapterError {
    AdapterError::Http(e.to_string())
}

pub async fn authenticate_v2(client: &reqwest::Client, config: &OpenStackConfig) -> Result<Endpoints, AdapterError> {
    let body = json!({
        "auth": {
            "passwordCredentials": {
                "username": config.username,
                "password": config.password,
            },
            "tenantName": config.project_name,
        }
    });

    let url = format!("{}/tokens", config.identity_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .header("Accept", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(AdapterError::Auth(format!("identity v2 auth failed: {}", resp.status())));
    }
    let parsed: Value = resp.json().await.map_err(http_err)?;

    let token = parsed["access"]["token"]["id"]
        .as_str()
        .ok_or_else(|| AdapterError::Auth("missing token id in v2 response".into()))?
        .to_string();

    let catalog = parsed["access"]["serviceCatalog"].as_array().cloned().unwrap_or_default();
    let compute_url = find_public_url(&catalog, "compute")?;
    let image_url = find_public_url(&catalog, "image").unwrap_or_default();
    let volume_url = find_public_url(&catalog, "volumev3")
        .or_else(|_| find_public_url(&catalog, "volume"))
        .unwrap_or_default();

    Ok(Endpoints { token, compute_url, image_url, volume_url })
}

pub async fn authenticate_v3(client: &reqwest::Client, config: &OpenStackConfig) -> Result<Endpoints, AdapterError> {
    let domain = config.domain_name.clone().unwrap_or_else(|| "default".to_string());
    let body = json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": config.username,
                        "domain": { "name": domain },
                        "password": config.password,
                    }
                }
            },
            "scope": {
                "project": {
                    "name": config.project_name,
                    "domain": { "name": domain },
                }
            }
        }
    });

    let url = format!("{}/auth/tokens", config.identity_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .header("Accept", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(AdapterError::Auth(format!("identity v3 auth failed: {}", resp.status())));
    }

    let token = resp
        .headers()
        .get("X-Subject-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AdapterError::Auth("missing X-Subject-Token header".into()))?
        .to_string();

    let parsed: Value = resp.json().await.map_err(http_err)?;
    let catalog = parsed["token"]["catalog"].as_array().cloned().unwrap_or_default();
    let compute_url = find_public_url_v3(&catalog, "compute")?;
    let image_url = find_public_url_v3(&catalog, "image").unwrap_or_default();
    let volume_url = find_public_url_v3(&catalog, "volumev3")
        .or_else(|_| find_public_url_v3(&catalog, "volume"))
        .unwrap_or_default();

    Ok(Endpoints { token, compute_url, image_url, volume_url })
}

fn find_public_url(catalog: &[Value], service_type: &str) -> Result<String, AdapterError> {
    for entry in catalog {
        if entry["type"].as_str() == Some(service_type) {
            if let Some(endpoints) = entry["endpoints"].as_array() {
                for ep in endpoints {
                    if let Some(url) = ep["publicURL"].as_str() {
                        return Ok(url.to_string());
                    }
                }
            }
        }
    }
    Err(AdapterError::NotFound(format!("no public endpoint for service type '{service_type}'")))
}

fn find_public_url_v3(catalog: &[Value], service_type: &str) -> Result<String, AdapterError> {
    for entry in catalog {
        if entry["type"].as_str() == Some(service_type) {
            if let Some(endpoints) = entry["endpoints"].as_array() {
                for ep in endpoints {
                    if ep["interface"].as_str() == Some("public") {
                        if let Some(url) = ep["url"].as_str() {
                            return Ok(url.to_string());
                        }
                    }
                }
            }
        }
    }
    Err(AdapterError::NotFound(format!("no public endpoint for service type '{service_type}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_catalog_lookup() {
        let catalog = vec![json!({
            "type": "compute",
            "endpoints": [{ "publicURL": "https://compute.example/v2.1/abc" }]
        })];
        assert_eq!(find_public_url(&catalog, "compute").unwrap(), "https://compute.example/v2.1/abc");
        assert!(find_public_url(&catalog, "volume").is_err());
    }

    #[test]
    fn v3_catalog_lookup_respects_interface() {
        let catalog = vec![json!({
            "type": "compute",
            "endpoints": [
                { "interface": "internal", "url": "https://internal.example" },
                { "interface": "public", "url": "https://compute.example" },
            ]
        })];
        assert_eq!(find_public_url_v3(&catalog, "compute").unwrap(), "https://compute.example");
    }
}
