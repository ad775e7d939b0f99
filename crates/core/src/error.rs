// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed error classification threaded from every fallible core operation up
//! to the cycle driver, replacing the source's exception-for-control-flow
//! style with an explicit `Transient | Policy | Fatal` result (see
//! SPEC_FULL.md §7, §9).

use thiserror::Error;

/// How the cycle driver should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retry next cycle; no state was mutated beyond what already committed.
    Transient,
    /// A deletion-policy rule fired; this is expected control flow, not a fault.
    Policy,
    /// Abort the process.
    Fatal,
}

#[derive(Debug, Error)]
pub enum VcycleError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("policy: {0}")]
    Policy(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VcycleError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Transient(_) | Self::Io(_) => Severity::Transient,
            Self::Policy(_) => Severity::Policy,
            Self::Fatal(_) | Self::Config(_) => Severity::Fatal,
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, VcycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_severity() {
        assert_eq!(VcycleError::transient("x").severity(), Severity::Transient);
        assert_eq!(VcycleError::policy("x").severity(), Severity::Policy);
        assert_eq!(VcycleError::fatal("x").severity(), Severity::Fatal);
        assert_eq!(VcycleError::Config("bad".into()).severity(), Severity::Fatal);
    }
}
