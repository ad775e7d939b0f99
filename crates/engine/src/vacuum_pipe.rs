// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The vacuum-pipe fetcher (SPEC_FULL.md §4.13): synthesises
//! machinetypes for a space from a remote JSON document, over the same
//! HTTP(S) policy as the cloud adapter.

use std::time::Duration;

use serde::Deserialize;
use vcycle_core::{ImageRef, Machinetype, MachinetypeCounters, VcycleError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(90);

/// Builds an HTTP client matching the cloud adapter's timeout/TLS policy
/// (§5, §6): a 90s request timeout and TLSv1 as the floor.
pub fn build_client() -> Result<reqwest::Client, VcycleError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .min_tls_version(reqwest::tls::Version::TLS_1_0)
        .build()
        .map_err(|e| VcycleError::fatal(format!("failed to build vacuum-pipe http client: {e}")))
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteMachinetypeDef {
    name: String,
    flavor_names: Vec<String>,
    min_processors: u32,
    max_processors: Option<u32>,
    processors_limit: Option<u32>,
    max_starting_processors: Option<u32>,
    backoff_seconds: Option<i64>,
    fizzle_seconds: Option<i64>,
    max_wallclock_seconds: Option<i64>,
    target_share: f64,
    root_image: String,
    root_public_key_path: Option<String>,
    user_data_template_path: Option<String>,
    heartbeat_file: Option<String>,
    heartbeat_seconds: Option<i64>,
    accounting_fqan: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PipeResponse {
    machinetypes: Vec<RemoteMachinetypeDef>,
}

/// Rejects a pipe-supplied path that is absolute or steps outside the
/// configured `user_data_directory` via `..` (§4.13).
fn is_path_safe(path: &str) -> bool {
    !path.starts_with('/') && !path.split('/').any(|segment| segment == "..")
}

fn to_machinetype(def: &RemoteMachinetypeDef, space_name: &str, prefix: &str) -> Result<Machinetype, String> {
    if let Some(path) = &def.root_public_key_path {
        if !is_path_safe(path) {
            return Err(format!("root_public_key_path '{path}' is unsafe"));
        }
    }
    if let Some(path) = &def.user_data_template_path {
        if !is_path_safe(path) {
            return Err(format!("user_data_template_path '{path}' is unsafe"));
        }
    }

    Ok(Machinetype {
        name: format!("{prefix}{}", def.name),
        space_name: space_name.to_string(),
        flavor_names: def.flavor_names.clone(),
        min_processors: def.min_processors,
        max_processors: def.max_processors,
        processors_limit: def.processors_limit.unwrap_or(u32::MAX),
        max_starting_processors: def.max_starting_processors.unwrap_or(u32::MAX),
        max_starting_seconds: Machinetype::max_starting_seconds_default(),
        backoff_seconds: def.backoff_seconds.unwrap_or(300),
        fizzle_seconds: def.fizzle_seconds.unwrap_or(600),
        max_wallclock_seconds: def.max_wallclock_seconds.unwrap_or_else(Machinetype::default_max_wallclock_seconds),
        target_share: def.target_share,
        rss_bytes_per_processor: Machinetype::default_rss_bytes_per_processor(),
        hs06_per_processor: None,
        root_image: ImageRef::parse(&def.root_image),
        root_public_key_path: def.root_public_key_path.clone(),
        heartbeat_file: def.heartbeat_file.clone(),
        heartbeat_seconds: def.heartbeat_seconds,
        cvmfs_proxy_machinetype: None,
        accounting_fqan: def.accounting_fqan.clone(),
        user_data_template_path: def.user_data_template_path.clone(),
        user_data_options: Default::default(),
        image_signing_dn: None,
        counters: MachinetypeCounters::default(),
    })
}

/// Rescales every machinetype's `target_share` so the set sums to
/// `pipe_target_share` (§4.13). A non-positive total leaves shares as-is.
pub fn renormalize_target_shares(machinetypes: &mut [Machinetype], pipe_target_share: f64) {
    let sum: f64 = machinetypes.iter().map(|m| m.target_share).sum();
    if sum <= 0.0 {
        return;
    }
    for mt in machinetypes.iter_mut() {
        mt.target_share = mt.target_share / sum * pipe_target_share;
    }
}

/// Parses a pipe response body into synthesised machinetypes, dropping (with
/// a warning) any whose paths are unsafe, then renormalising shares.
pub fn synthesize(response_body: &str, space_name: &str, prefix: &str, pipe_target_share: f64) -> Result<Vec<Machinetype>, VcycleError> {
    let response: PipeResponse =
        serde_json::from_str(response_body).map_err(|e| VcycleError::transient(format!("vacuum pipe: invalid JSON: {e}")))?;

    let mut machinetypes = Vec::new();
    for def in &response.machinetypes {
        match to_machinetype(def, space_name, prefix) {
            Ok(mt) => machinetypes.push(mt),
            Err(reason) => tracing::warn!(machinetype = %def.name, %reason, "vacuum pipe: rejected machinetype"),
        }
    }
    renormalize_target_shares(&mut machinetypes, pipe_target_share);
    Ok(machinetypes)
}

/// Fetches and parses one pipe section. A failure of any kind is Transient:
/// the caller should keep the previous cycle's synthesised machinetypes and
/// retry next cycle (§4.13).
pub async fn fetch_and_synthesize(
    client: &reqwest::Client,
    url: &str,
    space_name: &str,
    prefix: &str,
    pipe_target_share: f64,
) -> Result<Vec<Machinetype>, VcycleError> {
    let response = client.get(url).send().await.map_err(|e| VcycleError::transient(format!("vacuum pipe fetch failed: {e}")))?;
    let body = response.text().await.map_err(|e| VcycleError::transient(format!("vacuum pipe read failed: {e}")))?;
    synthesize(&body, space_name, prefix, pipe_target_share)
}
