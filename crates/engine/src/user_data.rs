// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The user-data renderer (SPEC_FULL.md §4.14): a pure string
//! transform from a machinetype's template plus its configured options into
//! the cloud-init payload handed to the VM factory.

use std::collections::BTreeMap;

const DEFAULT_TEMPLATE: &str = "#!/bin/sh\n# vcycle: no user_data_template_path configured\n";

/// Substitutes `${user_data_option_<key>}` with the matching value from
/// `options` and `${user_data_file_<key>}` with `file_contents(key)`.
/// Placeholders with no match are left verbatim (§4.14).
pub fn render(template: Option<&str>, options: &BTreeMap<String, String>, file_contents: impl Fn(&str) -> Option<String>) -> String {
    let template = template.unwrap_or(DEFAULT_TEMPLATE);
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let Some(end_offset) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end_offset;
        out.push_str(&rest[..start]);
        let placeholder = &rest[start + 2..end];

        if let Some(key) = placeholder.strip_prefix("user_data_option_") {
            match options.get(key) {
                Some(value) => out.push_str(value),
                None => out.push_str(&format!("${{{placeholder}}}")),
            }
        } else if let Some(key) = placeholder.strip_prefix("user_data_file_") {
            match file_contents(key) {
                Some(contents) => out.push_str(&contents),
                None => out.push_str(&format!("${{{placeholder}}}")),
            }
        } else {
            out.push_str(&format!("${{{placeholder}}}"));
        }

        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Prepends CVMFS proxy addresses drawn from a sibling machinetype's live
/// heartbeat list to an existing `CVMFS_HTTP_PROXY` value (§4.7 step 5).
/// `proxies` is already in newest-first order; joined with `|`, the
/// pre-existing value (if any) is appended after a `;`.
pub fn prepend_cvmfs_proxies(existing: Option<&str>, proxies: &[String]) -> Option<String> {
    if proxies.is_empty() {
        return existing.map(str::to_string);
    }
    let joined = proxies.join("|");
    match existing {
        Some(existing) if !existing.is_empty() => Some(format!("{joined};{existing}")),
        _ => Some(joined),
    }
}
