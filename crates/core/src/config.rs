// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! INI configuration loading: parses `.conf` files into `Settings`,
//! `Space`, and `Machinetype` definitions (SPEC_FULL.md §3 "Configuration
//! model", §4.12, §6).

use crate::error::VcycleError;
use crate::ids::{is_valid_machinetype_name, is_valid_space_name};
use crate::machinetype::{ImageRef, Machinetype, MachinetypeCounters};
use crate::space::{Space, SpaceCredentials, VacmonEndpoint};
use ini::Ini;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::warn;

const KNOWN_MACHINETYPE_KEYS: &[&str] = &[
    "flavor_names",
    "min_processors",
    "max_processors",
    "processors_limit",
    "max_starting_processors",
    "max_starting_seconds",
    "backoff_seconds",
    "fizzle_seconds",
    "max_wallclock_seconds",
    "target_share",
    "rss_bytes_per_processor",
    "hs06_per_processor",
    "root_image",
    "root_public_key_path",
    "heartbeat_file",
    "heartbeat_seconds",
    "cvmfs_proxy_machinetype",
    "accounting_fqan",
    "user_data_template_path",
    "image_signing_dn",
    // deprecated aliases
    "max_machines",
];

const KNOWN_SPACE_KEYS: &[&str] = &[
    "api",
    "api_version",
    "username",
    "password",
    "project_name",
    "domain_name",
    "network_uuid",
    "region",
    "security_groups",
    "processors_limit",
    "flavor_names",
    "volume_gb_per_processor",
    "shutdown_time",
    "gocdb_sitename",
    "vacmon_hostport",
    "https_host",
    "https_port",
    "cleanup_hours",
];

/// Process-wide options from `[settings]`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub state_directory: PathBuf,
    pub log_directory: PathBuf,
    pub log_level: String,
    pub hostname: String,
    pub user_data_directory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let hostname = hostname_or_default();
        Self {
            state_directory: PathBuf::from("/var/lib/vcycle"),
            log_directory: PathBuf::from("/var/log/vcycle"),
            log_level: "info".to_string(),
            hostname,
            user_data_directory: None,
        }
    }
}

fn hostname_or_default() -> String {
    hostname::get_or_unknown()
}

/// Tiny standalone hostname lookup, kept out of `Settings` construction so it
/// can be unit tested without touching the real `/etc/hostname`.
mod hostname {
    pub fn get_or_unknown() -> String {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| {
                std::process::Command::new("hostname")
                    .output()
                    .ok()
                    .filter(|o| o.status.success())
                    .and_then(|o| String::from_utf8(o.stdout).ok())
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// The fully materialised, validated configuration for one process.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub spaces: IndexMap<String, Space>,
}

type SectionProps = HashMap<String, String>;

impl Config {
    /// Loads every `*.conf` file in `dir`, in lexical filename order, merging
    /// sections of the same name (later files' keys win).
    pub fn load_dir(dir: &Path) -> Result<Self, VcycleError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(VcycleError::Io)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "conf").unwrap_or(false))
            .collect();
        paths.sort();
        Self::load_files(&paths)
    }

    pub fn load_files(paths: &[PathBuf]) -> Result<Self, VcycleError> {
        // section name -> merged key/value map, in first-seen order.
        let mut sections: IndexMap<String, SectionProps> = IndexMap::new();

        for path in paths {
            let ini = Ini::load_from_file(path)
                .map_err(|e| VcycleError::Config(format!("{}: {e}", path.display())))?;
            for (section_name, props) in ini.iter() {
                let Some(section_name) = section_name else { continue };
                let entry = sections.entry(section_name.to_string()).or_default();
                for (k, v) in props.iter() {
                    entry.insert(k.to_string(), v.to_string());
                }
            }
        }

        Self::from_sections(sections)
    }

    fn from_sections(sections: IndexMap<String, SectionProps>) -> Result<Self, VcycleError> {
        let mut settings = Settings::default();
        let mut spaces: IndexMap<String, Space> = IndexMap::new();

        for (section_name, props) in &sections {
            let words: Vec<&str> = section_name.split_whitespace().collect();
            match words.as_slice() {
                ["settings"] => apply_settings(&mut settings, props)?,
                ["space", name] => {
                    let space = parse_space(name, props)?;
                    spaces.insert(space.name.clone(), space);
                }
                _ => {}
            }
        }

        for (section_name, props) in &sections {
            let words: Vec<&str> = section_name.split_whitespace().collect();
            if let ["machinetype", space_name, mt_name] = words.as_slice() {
                let space = spaces.get_mut(*space_name).ok_or_else(|| {
                    VcycleError::Config(format!(
                        "machinetype section references unknown space '{space_name}'"
                    ))
                })?;
                let mt = parse_machinetype(space_name, mt_name, props)?;
                space.machinetypes.insert(mt.name.clone(), mt);
            }
        }

        if spaces.is_empty() {
            return Err(VcycleError::Config("no [space ...] sections found".into()));
        }

        Ok(Config { settings, spaces })
    }

    /// Render the materialised configuration back out as INI-shaped text,
    /// for `--show-conf` (§4.12).
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[settings]\n");
        out.push_str(&format!("state_directory = {}\n", self.settings.state_directory.display()));
        out.push_str(&format!("log_directory = {}\n", self.settings.log_directory.display()));
        out.push_str(&format!("log_level = {}\n", self.settings.log_level));
        out.push_str(&format!("hostname = {}\n\n", self.settings.hostname));

        for space in self.spaces.values() {
            out.push_str(&format!("[space {}]\n", space.name));
            out.push_str(&format!("api = {}\n", space.api));
            out.push_str(&format!("api_version = {}\n", space.api_version));
            if let Some(limit) = space.processors_limit {
                out.push_str(&format!("processors_limit = {limit}\n"));
            }
            out.push_str(&format!("cleanup_hours = {}\n\n", space.cleanup_hours));

            for mt in space.machinetypes.values() {
                out.push_str(&format!("[machinetype {} {}]\n", space.name, mt.name));
                out.push_str(&format!("min_processors = {}\n", mt.min_processors));
                out.push_str(&format!("processors_limit = {}\n", mt.processors_limit));
                out.push_str(&format!("target_share = {}\n", mt.target_share));
                out.push_str(&format!("backoff_seconds = {}\n", mt.backoff_seconds));
                out.push_str(&format!("fizzle_seconds = {}\n\n", mt.fizzle_seconds));
            }
        }
        out
    }
}

fn apply_settings(settings: &mut Settings, props: &SectionProps) -> Result<(), VcycleError> {
    for key in props.keys() {
        if !["state_directory", "log_directory", "log_level", "hostname", "user_data_directory"]
            .contains(&key.as_str())
        {
            return Err(VcycleError::Config(format!("unknown [settings] key '{key}'")));
        }
    }
    if let Some(v) = props.get("state_directory") {
        settings.state_directory = PathBuf::from(v);
    }
    if let Some(v) = props.get("log_directory") {
        settings.log_directory = PathBuf::from(v);
    }
    if let Some(v) = props.get("log_level") {
        settings.log_level = v.clone();
    }
    if let Some(v) = props.get("hostname") {
        settings.hostname = v.clone();
    }
    if let Some(v) = props.get("user_data_directory") {
        settings.user_data_directory = Some(PathBuf::from(v));
    }
    Ok(())
}

fn parse_space(name: &str, props: &SectionProps) -> Result<Space, VcycleError> {
    if !is_valid_space_name(name) {
        return Err(VcycleError::Config(format!("invalid space name '{name}'")));
    }
    for key in props.keys() {
        if !KNOWN_SPACE_KEYS.contains(&key.as_str()) {
            return Err(VcycleError::Config(format!("unknown [space {name}] key '{key}'")));
        }
    }

    let get = |k: &str| props.get(k).cloned();
    let vacmon_endpoints = get("vacmon_hostport")
        .map(|s| {
            s.split_whitespace()
                .filter_map(|hp| {
                    let (host, port) = hp.rsplit_once(':')?;
                    Some(VacmonEndpoint { host: host.to_string(), port: port.parse().ok()? })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Space {
        name: name.to_string(),
        api: get("api").unwrap_or_else(|| "openstack".to_string()),
        api_version: get("api_version").unwrap_or_else(|| "3".to_string()),
        credentials: SpaceCredentials {
            project_name: get("project_name").unwrap_or_default(),
            domain_name: get("domain_name"),
            username: get("username").unwrap_or_default(),
            password: get("password").unwrap_or_default(),
            identity_url: get("identity_url").unwrap_or_default(),
            network_uuid: get("network_uuid"),
            region: get("region"),
            security_groups: get("security_groups")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        },
        processors_limit: get("processors_limit").and_then(|s| s.parse().ok()),
        flavor_names: get("flavor_names")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        volume_gb_per_processor: get("volume_gb_per_processor").and_then(|s| s.parse().ok()).unwrap_or(0),
        shutdown_time: get("shutdown_time").and_then(|s| s.parse().ok()),
        gocdb_sitename: get("gocdb_sitename"),
        vacmon_endpoints,
        https_host: get("https_host"),
        https_port: get("https_port").and_then(|s| s.parse().ok()).unwrap_or_else(Space::default_https_port),
        cleanup_hours: get("cleanup_hours").and_then(|s| s.parse().ok()).unwrap_or_else(Space::default_cleanup_hours),
        machinetypes: IndexMap::new(),
        total_machines: 0,
        total_processors: 0,
        total_hs06: 0.0,
    })
}

fn parse_machinetype(space_name: &str, name: &str, props: &SectionProps) -> Result<Machinetype, VcycleError> {
    if !is_valid_machinetype_name(name) {
        return Err(VcycleError::Config(format!("invalid machinetype name '{name}'")));
    }
    for key in props.keys() {
        if !KNOWN_MACHINETYPE_KEYS.contains(&key.as_str()) {
            return Err(VcycleError::Config(format!(
                "unknown [machinetype {space_name} {name}] key '{key}'"
            )));
        }
    }

    let get = |k: &str| props.get(k).cloned();

    let processors_limit = if let Some(v) = get("processors_limit") {
        v.parse().map_err(|_| VcycleError::Config(format!("{name}: processors_limit must be an integer")))?
    } else if let Some(legacy) = get("max_machines") {
        warn!(machinetype = name, "max_machines is deprecated; treating as processors_limit (1 processor/machine)");
        legacy.parse().map_err(|_| VcycleError::Config(format!("{name}: max_machines must be an integer")))?
    } else {
        return Err(VcycleError::Config(format!("{name}: processors_limit is required")));
    };

    let min_processors = get("min_processors").and_then(|s| s.parse().ok()).unwrap_or(1);
    let max_processors = get("max_processors").and_then(|s| s.parse().ok());
    if let Some(max) = max_processors {
        if max < min_processors {
            return Err(VcycleError::Config(format!(
                "{name}: max_processors ({max}) must be >= min_processors ({min_processors})"
            )));
        }
    }

    let target_share: f64 = get("target_share").and_then(|s| s.parse().ok()).unwrap_or(1.0);
    if target_share < 0.0 {
        return Err(VcycleError::Config(format!("{name}: target_share must be >= 0")));
    }

    let root_image = get("root_image")
        .map(|s| ImageRef::parse(&s))
        .ok_or_else(|| VcycleError::Config(format!("{name}: root_image is required")))?;

    let mut user_data_options = BTreeMap::new();
    for (k, v) in props {
        if let Some(opt_key) = k.strip_prefix("user_data_option_").or_else(|| k.strip_prefix("user_data_file_")) {
            if !opt_key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
                return Err(VcycleError::Config(format!("{name}: invalid user-data option key '{k}'")));
            }
            user_data_options.insert(k.clone(), v.clone());
        }
    }

    Ok(Machinetype {
        name: name.to_string(),
        space_name: space_name.to_string(),
        flavor_names: get("flavor_names")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        min_processors,
        max_processors,
        processors_limit,
        max_starting_processors: get("max_starting_processors").and_then(|s| s.parse().ok()).unwrap_or(processors_limit),
        max_starting_seconds: get("max_starting_seconds")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(Machinetype::max_starting_seconds_default),
        backoff_seconds: get("backoff_seconds").and_then(|s| s.parse().ok()).unwrap_or(300),
        fizzle_seconds: get("fizzle_seconds").and_then(|s| s.parse().ok()).unwrap_or(600),
        max_wallclock_seconds: get("max_wallclock_seconds")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(Machinetype::default_max_wallclock_seconds),
        target_share,
        rss_bytes_per_processor: get("rss_bytes_per_processor")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(Machinetype::default_rss_bytes_per_processor),
        hs06_per_processor: get("hs06_per_processor").and_then(|s| s.parse().ok()),
        root_image,
        root_public_key_path: get("root_public_key_path"),
        heartbeat_file: get("heartbeat_file"),
        heartbeat_seconds: get("heartbeat_seconds").and_then(|s| s.parse().ok()),
        cvmfs_proxy_machinetype: get("cvmfs_proxy_machinetype"),
        accounting_fqan: get("accounting_fqan"),
        user_data_template_path: get("user_data_template_path"),
        user_data_options,
        image_signing_dn: get("image_signing_dn"),
        counters: MachinetypeCounters::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_conf(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_space_and_machinetype() {
        let dir = tempfile::tempdir().unwrap();
        write_conf(
            dir.path(),
            "01-base.conf",
            "[space example.space]\n\
             api = openstack\n\
             processors_limit = 100\n\
             \n\
             [machinetype example.space mt1]\n\
             root_image = image:cc7\n\
             processors_limit = 10\n\
             target_share = 2\n",
        );

        let cfg = Config::load_dir(dir.path()).unwrap();
        let space = cfg.spaces.get("example.space").unwrap();
        assert_eq!(space.processors_limit, Some(100));
        let mt = space.machinetypes.get("mt1").unwrap();
        assert_eq!(mt.processors_limit, 10);
        assert_eq!(mt.target_share, 2.0);
    }

    #[test]
    fn unknown_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_conf(dir.path(), "01-base.conf", "[space s]\nbogus_key = 1\n");
        let err = Config::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, VcycleError::Config(_)));
    }

    #[test]
    fn later_file_wins_on_overlapping_key() {
        let dir = tempfile::tempdir().unwrap();
        write_conf(dir.path(), "01-base.conf", "[space s]\nprocessors_limit = 10\n");
        write_conf(dir.path(), "02-override.conf", "[space s]\nprocessors_limit = 20\n");
        let cfg = Config::load_dir(dir.path()).unwrap();
        assert_eq!(cfg.spaces.get("s").unwrap().processors_limit, Some(20));
    }

    #[test]
    fn deprecated_alias_is_translated() {
        let dir = tempfile::tempdir().unwrap();
        write_conf(
            dir.path(),
            "01-base.conf",
            "[space s]\nprocessors_limit = 10\n\n[machinetype s mt1]\nroot_image = image:cc7\nmax_machines = 5\n",
        );
        let cfg = Config::load_dir(dir.path()).unwrap();
        let mt = cfg.spaces.get("s").unwrap().machinetypes.get("mt1").unwrap();
        assert_eq!(mt.processors_limit, 5);
    }

    #[test]
    fn max_processors_below_min_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_conf(
            dir.path(),
            "01-base.conf",
            "[space s]\nprocessors_limit = 10\n\n[machinetype s mt1]\nroot_image = image:cc7\nprocessors_limit = 5\nmin_processors = 4\nmax_processors = 2\n",
        );
        let err = Config::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, VcycleError::Config(_)));
    }
}
