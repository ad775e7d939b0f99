// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`Machinetype`] domain type: a named VM recipe inside a space
//! (SPEC_FULL.md §3).

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_WALLCLOCK_SECONDS: i64 = 86_400;
const DEFAULT_RSS_BYTES_PER_PROCESSOR: u64 = 2 * 1024 * 1024 * 1024;

/// Image reference forms accepted for `root_image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRef {
    /// `image:<name>` — resolve by name against the image service.
    Named(String),
    /// An absolute or template-relative filesystem path.
    Path(String),
    /// A URL to fetch into the local image cache.
    Url(String),
}

impl ImageRef {
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix("image:") {
            Self::Named(name.to_string())
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(raw.to_string())
        }
    }
}

/// A named recipe inside a space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machinetype {
    pub name: String,
    pub space_name: String,
    /// Candidate flavor names in order of preference.
    pub flavor_names: Vec<String>,
    pub min_processors: u32,
    pub max_processors: Option<u32>,
    pub processors_limit: u32,
    pub max_starting_processors: u32,
    pub max_starting_seconds: i64,
    pub backoff_seconds: i64,
    pub fizzle_seconds: i64,
    pub max_wallclock_seconds: i64,
    pub target_share: f64,
    pub rss_bytes_per_processor: u64,
    pub hs06_per_processor: Option<f64>,
    pub root_image: ImageRef,
    pub root_public_key_path: Option<String>,
    pub heartbeat_file: Option<String>,
    pub heartbeat_seconds: Option<i64>,
    pub cvmfs_proxy_machinetype: Option<String>,
    pub accounting_fqan: Option<String>,
    pub user_data_template_path: Option<String>,
    pub user_data_options: std::collections::BTreeMap<String, String>,
    pub image_signing_dn: Option<String>,

    /// Per-cycle counters, reset at the start of every cycle.
    #[serde(skip)]
    pub counters: MachinetypeCounters,
}

/// Per-cycle bookkeeping reset by the space cycle driver before the classifier runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MachinetypeCounters {
    pub total_machines: u32,
    pub total_processors: u32,
    pub starting_processors: u32,
    pub running_machines: u32,
    pub running_processors: u32,
    pub not_passed_fizzle: u32,
    pub weighted_machines: f64,
    pub running_hs06: Option<f64>,
}

impl Machinetype {
    pub fn max_starting_seconds_default() -> i64 {
        3600
    }

    pub fn default_max_wallclock_seconds() -> i64 {
        DEFAULT_MAX_WALLCLOCK_SECONDS
    }

    pub fn default_rss_bytes_per_processor() -> u64 {
        DEFAULT_RSS_BYTES_PER_PROCESSOR
    }

    /// Whether a flavor's processor count satisfies `min_processors ≤ p ≤ (max_processors ∨ ∞)`.
    pub fn accepts_processors(&self, processors: u32) -> bool {
        processors >= self.min_processors
            && self.max_processors.map(|max| processors <= max).unwrap_or(true)
    }

    /// `weight / target_share` contribution used by the fair-share allocator (§4.6).
    pub fn weight_contribution(&self, hs06: Option<f64>, processors: u32) -> f64 {
        if self.target_share <= 0.0 {
            return 0.0;
        }
        let weight = hs06.unwrap_or(processors as f64);
        weight / self.target_share
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_ref_parsing() {
        assert_eq!(ImageRef::parse("image:cc7"), ImageRef::Named("cc7".into()));
        assert_eq!(ImageRef::parse("https://example.org/x.img"), ImageRef::Url("https://example.org/x.img".into()));
        assert_eq!(ImageRef::parse("/var/lib/images/x.img"), ImageRef::Path("/var/lib/images/x.img".into()));
    }

    #[test]
    fn processors_range_accepted() {
        let mut mt = sample();
        mt.min_processors = 2;
        mt.max_processors = Some(4);
        assert!(!mt.accepts_processors(1));
        assert!(mt.accepts_processors(2));
        assert!(mt.accepts_processors(4));
        assert!(!mt.accepts_processors(5));
    }

    #[test]
    fn unbounded_max_processors_accepts_any_above_min() {
        let mut mt = sample();
        mt.min_processors = 1;
        mt.max_processors = None;
        assert!(mt.accepts_processors(64));
    }

    #[test]
    fn weight_contribution_disabled_when_share_non_positive() {
        let mut mt = sample();
        mt.target_share = 0.0;
        assert_eq!(mt.weight_contribution(None, 4), 0.0);
    }

    fn sample() -> Machinetype {
        Machinetype {
            name: "mt1".into(),
            space_name: "space1".into(),
            flavor_names: vec!["m1.small".into()],
            min_processors: 1,
            max_processors: None,
            processors_limit: 100,
            max_starting_processors: 10,
            max_starting_seconds: Machinetype::max_starting_seconds_default(),
            backoff_seconds: 300,
            fizzle_seconds: 600,
            max_wallclock_seconds: Machinetype::default_max_wallclock_seconds(),
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
}
