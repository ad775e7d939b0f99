// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compute (Nova) calls: servers, flavors, limits, and key pairs (§4.2).

use super::identity::Endpoints;
use crate::cloud::{AdapterError, Flavor, ServerRecord, ServerSpec};
use serde_json::{json, Value};
use std::collections::HashMap;

fn http_err(e: reqwest::Error) -> AdapterError {
    AdapterError::Http(e.to_string())
}

pub async fn list_servers(client: &reqwest::Client, endpoints: &Endpoints) -> Result<Vec<ServerRecord>, AdapterError> {
    let url = format!("{}/servers/detail", endpoints.compute_url.trim_end_matches('/'));
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
    let servers = parsed["servers"].as_array().cloned().unwrap_or_default();

    Ok(servers.iter().map(server_record_from_json).collect())
}

/// Every failure to parse an optional field collapses to `None`, matching
/// the source's broad `except` fallbacks around each attribute lookup.
fn server_record_from_json(server: &Value) -> ServerRecord {
    let name = server["metadata"]["name"].as_str().unwrap_or_else(|| server["name"].as_str().unwrap_or("")).to_string();

    let uuid = server["id"].as_str().unwrap_or("").to_string();
    let flavor_id = server["flavor"]["id"].as_str().unwrap_or("").to_string();

    let address = server["addresses"]
        .as_object()
        .and_then(|networks| networks.keys().min())
        .and_then(|first_network| server["addresses"][first_network].as_array())
        .and_then(|members| members.first())
        .and_then(|member| member["addr"].as_str())
        .map(str::to_string);

    ServerRecord {
        name,
        uuid,
        flavor_id,
        address,
        created: server["created"].as_str().map(str::to_string),
        updated: server["updated"].as_str().map(str::to_string),
        launched_at: server["OS-SRV-USG:launched_at"].as_str().map(str::to_string),
        task_state: server["OS-EXT-STS:task_state"].as_str().map(str::to_string),
        power_state: server["OS-EXT-STS:power_state"].as_i64().map(|n| n as i32),
        status: server["status"].as_str().unwrap_or("UNKNOWN").to_string(),
        machinetype: server["metadata"]["machinetype"].as_str().map(str::to_string),
        availability_zone: server["OS-EXT-AZ:availability_zone"].as_str().map(str::to_string),
    }
}

pub async fn list_flavors(client: &reqwest::Client, endpoints: &Endpoints) -> Result<HashMap<String, Flavor>, AdapterError> {
    let url = format!("{}/flavors/detail", endpoints.compute_url.trim_end_matches('/'));
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

    let mut flavors = HashMap::new();
    for entry in parsed["flavors"].as_array().cloned().unwrap_or_default() {
        let Some(name) = entry["name"].as_str() else { continue };
        flavors.insert(
            name.to_string(),
            Flavor {
                id: entry["id"].as_str().unwrap_or_default().to_string(),
                mb: entry["ram"].as_u64().unwrap_or(0) as u32,
                processors: entry["vcpus"].as_u64().unwrap_or(0) as u32,
            },
        );
    }
    Ok(flavors)
}

pub async fn processors_limit(client: &reqwest::Client, endpoints: &Endpoints) -> Result<Option<u32>, AdapterError> {
    let url = format!("{}/limits", endpoints.compute_url.trim_end_matches('/'));
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
    Ok(parsed["limits"]["absolute"]["maxTotalCores"].as_i64().map(|n| n as u32))
}

pub async fn ensure_key_pair(client: &reqwest::Client, endpoints: &Endpoints, public_key: &str) -> Result<String, AdapterError> {
    let public_key = public_key.trim();
    let url = format!("{}/os-keypairs", endpoints.compute_url.trim_end_matches('/'));
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

    let wanted = format!("{public_key} vcycle");
    for entry in parsed["keypairs"].as_array().cloned().unwrap_or_default() {
        if entry["keypair"]["public_key"].as_str() == Some(wanted.as_str()) {
            if let Some(name) = entry["keypair"]["name"].as_str() {
                return Ok(name.to_string());
            }
        }
    }

    let key_name = format!("vcycle-{}", uuid::Uuid::new_v4().simple());
    let body = json!({ "keypair": { "name": key_name, "public_key": wanted } });
    let resp = client
        .post(&url)
        .header("X-Auth-Token", &endpoints.token)
        .json(&body)
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(AdapterError::Http(format!("POST {url} returned {}", resp.status())));
    }

    Ok(key_name)
}

pub async fn create_server(client: &reqwest::Client, endpoints: &Endpoints, spec: ServerSpec) -> Result<String, AdapterError> {
    use base64::Engine;

    let mut metadata = spec.metadata.clone();
    metadata.entry("name".to_string()).or_insert_with(|| spec.name.clone());

    let mut server = json!({
        "name": spec.name,
        "imageRef": spec.image_id,
        "flavorRef": spec.flavor_id,
        "user_data": base64::engine::general_purpose::STANDARD.encode(spec.user_data.as_bytes()),
        "metadata": metadata,
        "key_name": spec.key_pair_name,
    });

    if let Some(network_uuid) = &spec.network_uuid {
        server["networks"] = json!([{ "uuid": network_uuid }]);
    }
    if let Some(zone) = &spec.availability_zone {
        server["availability_zone"] = json!(zone);
    }
    if !spec.security_groups.is_empty() {
        server["security_groups"] = json!(spec.security_groups.iter().map(|name| json!({ "name": name })).collect::<Vec<_>>());
    }
    if let Some(bdm) = &spec.block_device_mapping {
        server["block_device_mapping_v2"] = json!([{
            "source_type": "volume",
            "uuid": bdm.volume_id,
            "delete_on_termination": bdm.delete_on_termination,
            "boot_index": 0,
            "destination_type": "volume",
        }]);
    }

    let url = format!("{}/servers", endpoints.compute_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .header("X-Auth-Token", &endpoints.token)
        .json(&json!({ "server": server }))
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(AdapterError::Http(format!("POST {url} returned {}", resp.status())));
    }
    let parsed: Value = resp.json().await.map_err(http_err)?;
    parsed["server"]["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Http("server creation response missing id".into()))
}

pub async fn delete_server(client: &reqwest::Client, endpoints: &Endpoints, uuid: &str) -> Result<(), AdapterError> {
    let url = format!("{}/servers/{uuid}", endpoints.compute_url.trim_end_matches('/'));
    let resp = client
        .delete(&url)
        .header("X-Auth-Token", &endpoints.token)
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() && resp.status().as_u16() != 404 {
        return Err(AdapterError::Http(format!("DELETE {url} returned {}", resp.status())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_record_falls_back_to_plain_name() {
        let server = json!({
            "id": "abc",
            "name": "not-vcycle",
            "status": "ACTIVE",
            "flavor": { "id": "1" },
        });
        let record = server_record_from_json(&server);
        assert_eq!(record.name, "not-vcycle");
        assert_eq!(record.address, None);
    }

    #[test]
    fn server_record_prefers_metadata_name() {
        let server = json!({
            "id": "abc",
            "name": "something-else",
            "metadata": { "name": "vcycle-batch-abc1234567", "machinetype": "batch" },
            "status": "ACTIVE",
            "addresses": { "provider": [{ "addr": "10.0.0.5" }] },
        });
        let record = server_record_from_json(&server);
        assert_eq!(record.name, "vcycle-batch-abc1234567");
        assert_eq!(record.address.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.machinetype.as_deref(), Some("batch"));
    }
}
