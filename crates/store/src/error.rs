// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store I/O error at {path}: {source}")]
    Io { path: std::path::PathBuf, source: std::io::Error },
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: std::path::PathBuf::new(), source }
    }
}
