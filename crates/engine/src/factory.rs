// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The VM factory (SPEC_FULL.md §4.7): turns one fair-share allocator
//! pick into a running cloud request plus the persisted [`Machine`] record
//! that tracks it from `Starting` onward.

use std::collections::HashMap;

use vcycle_adapters::{AdapterError, BlockDeviceMapping, CloudAdapter, Flavor, ServerSpec};
use vcycle_core::{ImageRef, Machine, MachineName, MachineState, Machinetype, Space, VcycleError};
use vcycle_store::StateStore;

use crate::user_data;

fn to_transient(err: AdapterError) -> VcycleError {
    VcycleError::transient(err.to_string())
}

/// Picks the first configured flavor name whose processor count satisfies
/// the machinetype's `min_processors ≤ p ≤ max_processors` range (§4.7 step 1).
pub fn choose_flavor<'a>(machinetype: &Machinetype, flavors: &'a HashMap<String, Flavor>) -> Result<&'a Flavor, VcycleError> {
    machinetype
        .flavor_names
        .iter()
        .filter_map(|name| flavors.get(name))
        .find(|flavor| machinetype.accepts_processors(flavor.processors))
        .ok_or_else(|| VcycleError::policy(format!("no flavor for machinetype {} satisfies its processor range", machinetype.name)))
}

/// Resolves `machinetype.root_image` to a cloud image id, uploading when the
/// image catalog has no matching entry (§4.7 step 3). URL-sourced images are
/// expected to already exist in the catalog by name: fetching a URL into a
/// local cache is out of scope for this step (see design notes).
pub async fn resolve_image_id(adapter: &dyn CloudAdapter, machinetype: &Machinetype) -> Result<String, VcycleError> {
    match &machinetype.root_image {
        ImageRef::Named(name) | ImageRef::Url(name) => adapter
            .find_image(name)
            .await
            .map_err(to_transient)?
            .ok_or_else(|| VcycleError::policy(format!("image '{name}' not found in catalog for machinetype {}", machinetype.name))),
        ImageRef::Path(path) => {
            let metadata = std::fs::metadata(path).map_err(VcycleError::Io)?;
            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            let name = std::path::Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(path)
                .to_string();
            if let Some(id) = adapter.find_image(&name).await.map_err(to_transient)? {
                return Ok(id);
            }
            adapter.upload_image(path, &name, last_modified).await.map_err(to_transient)
        }
    }
}

/// Everything the factory needs beyond the machinetype/space/adapter
/// themselves. `public_key` is the raw contents of the configured public
/// key file; `cvmfs_proxy_addresses` is the live heartbeat-derived proxy
/// list for the machinetype's configured `cvmfs_proxy_machinetype`, if any
/// (§4.11), already newest-first.
pub struct FactoryInputs<'a> {
    pub flavors: &'a HashMap<String, Flavor>,
    pub public_key: &'a str,
    pub cvmfs_proxy_addresses: &'a [String],
    pub local_hostname: &'a str,
    pub now: i64,
}

/// Builds and submits a new VM for `machinetype`, persisting its
/// state-store files and returning the `Starting` [`Machine`] to register
/// (§4.7). A failing call here is logged by the caller and simply counted
/// against this cycle's budget; the allocator's own counters already
/// account for it (§4.6 step 5).
pub async fn create_machine(
    adapter: &dyn CloudAdapter,
    store: &StateStore,
    space: &Space,
    machinetype: &Machinetype,
    inputs: &FactoryInputs<'_>,
) -> Result<Machine, VcycleError> {
    let flavor = choose_flavor(machinetype, inputs.flavors)?;
    let name = MachineName::generate(&machinetype.name);

    let block_device_mapping = if space.volume_gb_per_processor > 0 {
        let size_gib = space.volume_gb_per_processor * flavor.processors;
        let image_id = resolve_image_id(adapter, machinetype).await?;
        let volume_id = adapter
            .create_volume(name.as_str(), size_gib, &image_id, space.credentials.region.as_deref())
            .await
            .map_err(to_transient)?;
        adapter.wait_until_attachable(&volume_id).await.map_err(to_transient)?;
        Some(BlockDeviceMapping { volume_id, delete_on_termination: true })
    } else {
        None
    };

    let image_id = if block_device_mapping.is_some() {
        // Already resolved above to create the volume; boot-from-volume
        // servers do not need a separate image id on the create call.
        String::new()
    } else {
        resolve_image_id(adapter, machinetype).await?
    };

    let key_pair_name = adapter.ensure_key_pair(inputs.public_key).await.map_err(to_transient)?;

    let rendered_user_data = {
        let template = machinetype.user_data_template_path.as_deref();
        let base = user_data::render(template, &machinetype.user_data_options, |_| None);
        user_data::prepend_cvmfs_proxies(Some(&base), inputs.cvmfs_proxy_addresses).unwrap_or(base)
    };

    let job_shutdown = inputs.now + machinetype.max_wallclock_seconds;
    let shutdown_time_job = match space.shutdown_time {
        Some(space_shutdown) => job_shutdown.min(space_shutdown),
        None => job_shutdown,
    };

    let mut metadata = HashMap::new();
    metadata.insert("cern-services".to_string(), "false".to_string());
    metadata.insert("name".to_string(), name.as_str().to_string());
    metadata.insert("machinetype".to_string(), machinetype.name.clone());
    metadata.insert("machinefeatures_shutdowntime".to_string(), shutdown_time_job.to_string());
    metadata.insert("jobfeatures_shutdowntime_job".to_string(), shutdown_time_job.to_string());

    let spec = ServerSpec {
        name: name.as_str().to_string(),
        flavor_id: flavor.id.clone(),
        image_id,
        key_pair_name,
        network_uuid: space.credentials.network_uuid.clone(),
        security_groups: space.credentials.security_groups.clone(),
        availability_zone: space.credentials.region.clone(),
        metadata,
        user_data: rendered_user_data.clone(),
        block_device_mapping,
    };

    let uuid = adapter.create_server(spec).await.map_err(to_transient)?;

    store.put(&space.name, name.as_str(), "created", inputs.now.to_string().as_bytes(), 0o640)?;
    store.put(&space.name, name.as_str(), "updated", inputs.now.to_string().as_bytes(), 0o640)?;
    store.put(&space.name, name.as_str(), "machinetype_name", machinetype.name.as_bytes(), 0o640)?;
    store.put(&space.name, name.as_str(), "space_name", space.name.as_bytes(), 0o640)?;
    store.put(&space.name, name.as_str(), "manager", inputs.local_hostname.as_bytes(), 0o640)?;
    store.put(&space.name, name.as_str(), "user_data", rendered_user_data.as_bytes(), 0o640)?;
    store.put_nested(&space.name, name.as_str(), "machinefeatures", "shutdowntime", shutdown_time_job.to_string().as_bytes(), 0o644)?;
    store.put_nested(&space.name, name.as_str(), "jobfeatures", "shutdowntime_job", shutdown_time_job.to_string().as_bytes(), 0o644)?;

    Ok(Machine {
        name,
        space_name: space.name.clone(),
        machinetype_name: machinetype.name.clone(),
        state: MachineState::Starting,
        ip: "0.0.0.0".to_string(),
        uuid: Some(uuid),
        created_time: inputs.now,
        started_time: None,
        updated_time: inputs.now,
        stopped_time: None,
        deleted_time: None,
        heartbeat_time: None,
        shutdown_message: None,
        shutdown_message_time: None,
        zone: space.credentials.region.clone(),
        processors: flavor.processors,
        hs06: machinetype.hs06_per_processor.map(|per| per * f64::from(flavor.processors)),
        manager: inputs.local_hostname.to_string(),
        manager_heartbeat_time: inputs.now,
        shutdown_time_job: Some(shutdown_time_job),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcycle_adapters::FakeCloudAdapter;
    use vcycle_core::MachinetypeCounters;

    fn flavors() -> HashMap<String, Flavor> {
        let mut m = HashMap::new();
        m.insert("m1.small".to_string(), Flavor { id: "flavor-1".into(), mb: 4096, processors: 2 });
        m
    }

    fn machinetype() -> Machinetype {
        Machinetype {
            name: "mt1".into(),
            space_name: "s".into(),
            flavor_names: vec!["m1.small".into()],
            min_processors: 1,
            max_processors: None,
            processors_limit: 100,
            max_starting_processors: 10,
            max_starting_seconds: 3600,
            backoff_seconds: 300,
            fizzle_seconds: 600,
            max_wallclock_seconds: 86_400,
            target_share: 1.0,
            rss_bytes_per_processor: Machinetype::default_rss_bytes_per_processor(),
            hs06_per_processor: None,
            root_image: ImageRef::Named("cc7".into()),
            root_public_key_path: None,
            heartbeat_file: None,
            heartbeat_seconds: None,
            cvmfs_proxy_machinetype: None,
            accounting_fqan: None,
            user_data_template_path: None,
            user_data_options: Default::default(),
            image_signing_dn: None,
            counters: MachinetypeCounters::default(),
        }
    }

    fn space() -> Space {
        Space {
            name: "s".into(),
            api: "openstack".into(),
            api_version: "3".into(),
            credentials: vcycle_core::SpaceCredentials {
                project_name: "t".into(),
                domain_name: None,
                username: "u".into(),
                password: "p".into(),
                identity_url: "https://example".into(),
                network_uuid: Some("net-1".into()),
                region: None,
                security_groups: vec![],
            },
            processors_limit: Some(100),
            flavor_names: vec![],
            volume_gb_per_processor: 0,
            shutdown_time: None,
            gocdb_sitename: None,
            vacmon_endpoints: vec![],
            https_host: None,
            https_port: 443,
            cleanup_hours: 72,
            machinetypes: Default::default(),
            total_machines: 0,
            total_processors: 0,
            total_hs06: 0.0,
        }
    }

    #[test]
    fn flavor_choice_rejects_out_of_range() {
        let mut mt = machinetype();
        mt.min_processors = 4;
        let err = choose_flavor(&mt, &flavors()).unwrap_err();
        assert!(matches!(err, VcycleError::Policy(_)));
    }

    #[tokio::test]
    async fn create_machine_produces_a_starting_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let adapter = FakeCloudAdapter::new();

        let inputs = FactoryInputs {
            flavors: &flavors(),
            public_key: "ssh-rsa AAA vcycle",
            cvmfs_proxy_addresses: &[],
            local_hostname: "host-a",
            now: 1_000,
        };

        let machine = create_machine(&adapter, &store, &space(), &machinetype(), &inputs).await.unwrap();
        assert_eq!(machine.state, MachineState::Starting);
        assert_eq!(machine.ip, "0.0.0.0");
        assert_eq!(machine.processors, 2);
        assert_eq!(store.get("s", machine.name.as_str(), "machinetype_name"), Some("mt1".to_string()));
    }
}
