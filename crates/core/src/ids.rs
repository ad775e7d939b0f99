// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name types for spaces, machinetypes, and machines.

use std::fmt;

/// A machine name: `vcycle-<machinetype>-<10 lowercase-alnum>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MachineName(String);

const SUFFIX_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

impl MachineName {
    /// Mint a fresh name for a new machine of the given machinetype.
    pub fn generate(machinetype: &str) -> Self {
        let suffix = nanoid::nanoid!(10, &SUFFIX_ALPHABET);
        Self(format!("vcycle-{machinetype}-{suffix}"))
    }

    /// Wrap an existing name observed from the cloud or the state store.
    pub fn from_string(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Machines not carrying this prefix are unmanaged: their processors
    /// still count toward the space total but they are otherwise ignored.
    pub fn is_managed_prefix(name: &str) -> bool {
        name.starts_with("vcycle-")
    }
}

impl fmt::Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MachineName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<MachineName> for String {
    fn from(value: MachineName) -> Self {
        value.0
    }
}

/// Validate a space name: dotted, lowercased, `[a-z0-9.-]`.
pub fn is_valid_space_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
}

/// Validate a machinetype name: `[a-z0-9-]`.
pub fn is_valid_machinetype_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
